//! Hook through which the vault tells the account repository about records.

use crate::types::PublicId;

/// Receives notifications after a key record is created or removed.
///
/// Called only once the store mutation has succeeded. Implementations must
/// not call back into the vault for the same account from inside a
/// notification.
pub trait AccountRegistry: Send + Sync {
    /// A key record now exists for `id`.
    fn key_record_created(&self, id: &PublicId);

    /// The key record for `id` has been deleted.
    fn key_record_removed(&self, id: &PublicId);
}
