//! End-to-end vault behaviour on the filesystem store.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{account, deadbeef_key, file_vault, test_config};
use keyvault_core::config::MutationPolicy;
use keyvault_core::passphrase::PassphraseChange;
use keyvault_core::record::AccountKeyRecord;
use keyvault_core::store::{FileVaultStore, VaultStore};
use keyvault_core::{KeyMaterial, KeyVault, VaultError};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unlock_and_rekey_scenario() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");

    t.vault
        .create(&id, b"correct-horse", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let key = t.vault.open(&id, b"correct-horse").await.expect("open");
    assert_eq!(key.expose(), deadbeef_key().as_slice());

    assert!(matches!(
        t.vault.open(&id, b"wrong").await,
        Err(VaultError::WrongPassphrase)
    ));

    t.vault
        .re_key(&id, b"correct-horse", b"new-pass")
        .await
        .expect("rekey");

    let key = t.vault.open(&id, b"new-pass").await.expect("open new");
    assert_eq!(key.expose(), deadbeef_key().as_slice());
    assert!(matches!(
        t.vault.open(&id, b"correct-horse").await,
        Err(VaultError::WrongPassphrase)
    ));
}

#[tokio::test]
async fn test_record_file_layout() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"pw", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let path = t.store.paths().record_path(&id);
    // sha256("rAcct1")
    assert!(path.ends_with(
        "keyvault/records/00bd9d839d095f4bbf3cdf365ae77495deef68238dd3743a7faad7c94d616c8f.akr"
    ));
    let bytes = fs::read(&path).expect("read record file");
    assert_eq!(&bytes[..4], b"AKVR");

    let record = AccountKeyRecord::decode(&bytes).expect("decode");
    assert_eq!(record.public_id, id);
    assert_eq!(record.created_at, record.updated_at);
    assert!(!bytes
        .windows(deadbeef_key().len())
        .any(|window| window == deadbeef_key().as_slice()));
}

#[tokio::test]
async fn test_longest_ids_create_open_and_list() {
    let t = file_vault(MutationPolicy::Queue);
    let longest = account(&"a".repeat(keyvault_core::types::MAX_PUBLIC_ID_LEN));
    let uncompressed_key = account(&format!("0x04{}", "c3".repeat(64)));

    for id in [&longest, &uncompressed_key] {
        t.vault
            .create(id, b"pw", KeyMaterial::new(deadbeef_key()))
            .await
            .expect("create");
        let key = t.vault.open(id, b"pw").await.expect("open");
        assert_eq!(key.expose(), deadbeef_key().as_slice());
        t.vault.re_key(id, b"pw", b"next").await.expect("rekey");
    }

    let mut expected = vec![longest.clone(), uncompressed_key.clone()];
    expected.sort();
    assert_eq!(t.vault.list_accounts().await.expect("list"), expected);
    assert_eq!(
        t.registry.events(),
        vec![format!("created:{longest}"), format!("created:{uncompressed_key}")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_vaults_on_one_root_create_once() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    let rivals: Vec<KeyVault> = (0..4)
        .map(|_| {
            let store = FileVaultStore::open(t.store.paths().root()).expect("open store");
            KeyVault::new(Arc::new(store), test_config(MutationPolicy::Queue)).expect("vault")
        })
        .collect();

    let attempts = rivals.into_iter().enumerate().map(|(n, vault)| {
        let id = id.clone();
        tokio::spawn(async move {
            let pass = format!("pass-{n}");
            let result = vault
                .create(&id, pass.as_bytes(), KeyMaterial::new(deadbeef_key()))
                .await;
            (pass, result)
        })
    });

    let mut winners = Vec::new();
    for attempt in attempts.collect::<Vec<_>>() {
        match attempt.await.expect("join") {
            (pass, Ok(())) => winners.push(pass),
            (_, Err(VaultError::AlreadyExists)) => {}
            (_, Err(other)) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);
    let key = t
        .vault
        .open(&id, winners[0].as_bytes())
        .await
        .expect("winner's passphrase opens the record");
    assert_eq!(key.expose(), deadbeef_key().as_slice());
}

#[tokio::test]
async fn test_wrong_old_passphrase_leaves_file_identical() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"old", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");
    let before = t.store.read(&id).expect("read");

    assert!(matches!(
        t.vault.re_key(&id, b"not-old", b"new").await,
        Err(VaultError::WrongPassphrase)
    ));
    assert_eq!(t.store.read(&id).expect("read"), before);
    assert!(t.vault.open(&id, b"old").await.is_ok());
}

#[tokio::test]
async fn test_create_on_existing_id_keeps_bytes() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"pw", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");
    let before = t.store.read(&id).expect("read");

    assert!(matches!(
        t.vault
            .create(&id, b"other", KeyMaterial::new(vec![1; 32]))
            .await,
        Err(VaultError::AlreadyExists)
    ));
    assert_eq!(t.store.read(&id).expect("read"), before);
    assert_eq!(t.registry.events(), vec!["created:rAcct1".to_string()]);
}

#[tokio::test]
async fn test_truncated_record_file_is_wrong_passphrase() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"pw", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let path = t.store.paths().record_path(&id);
    let bytes = fs::read(&path).expect("read");
    fs::write(&path, &bytes[..bytes.len() / 2]).expect("truncate");

    assert!(matches!(
        t.vault.open(&id, b"pw").await,
        Err(VaultError::WrongPassphrase)
    ));
}

#[tokio::test]
async fn test_leftover_temp_file_does_not_shadow_record() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"pw", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let temp = t.store.paths().temp_record_path(&id);
    fs::write(&temp, b"AKVR\0\x01partial").expect("write leftover");

    assert!(t.vault.open(&id, b"pw").await.is_ok());
    assert_eq!(t.vault.list_accounts().await.expect("list"), vec![id.clone()]);

    t.vault.re_key(&id, b"pw", b"next").await.expect("rekey");
    assert!(!temp.exists());
    assert!(t.vault.open(&id, b"next").await.is_ok());
}

#[tokio::test]
async fn test_remove_then_open_is_not_found() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"pw", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");
    t.vault.remove(&id).await.expect("remove");

    assert!(!t.store.paths().record_path(&id).exists());
    assert!(matches!(
        t.vault.open(&id, b"pw").await,
        Err(VaultError::NotFound)
    ));
    assert_eq!(
        t.registry.events(),
        vec!["created:rAcct1".to_string(), "removed:rAcct1".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rekeys_are_serialized() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"p0", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    // Each task moves from the passphrase it expects to a new one. With
    // serialization exactly one task can start from "p0".
    let mut handles = Vec::new();
    for n in 1..=4 {
        let vault = t.vault.clone();
        let id = id.clone();
        let next = format!("p{n}");
        handles.push(tokio::spawn(async move {
            vault.re_key(&id, b"p0", next.as_bytes()).await
        }));
    }

    let mut winners = Vec::new();
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await.expect("join") {
            Ok(()) => winners.push(index + 1),
            Err(VaultError::WrongPassphrase) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let winner = format!("p{}", winners[0]);
    let key = t.vault.open(&id, winner.as_bytes()).await.expect("open");
    assert_eq!(key.expose(), deadbeef_key().as_slice());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reject_policy_reports_busy_under_contention() {
    let t = file_vault(MutationPolicy::Reject);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"p0", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let vault = t.vault.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            vault.re_key(&id, b"p0", b"p0").await
        }));
    }

    for handle in handles {
        match handle.await.expect("join") {
            Ok(()) | Err(VaultError::Busy) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(t.vault.open(&id, b"p0").await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_rekey_leaves_a_whole_record() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"old", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let _ = tokio::time::timeout(
        Duration::from_micros(1),
        t.vault.re_key(&id, b"old", b"new"),
    )
    .await;

    // Queues behind the abandoned rekey if it is still running.
    let finished = match t.vault.re_key(&id, b"new", b"final").await {
        Ok(()) => true,
        Err(VaultError::WrongPassphrase) => false,
        Err(other) => panic!("unexpected error: {other}"),
    };
    if !finished {
        t.vault
            .re_key(&id, b"old", b"final")
            .await
            .expect("rekey from old");
    }
    let key = t.vault.open(&id, b"final").await.expect("open");
    assert_eq!(key.expose(), deadbeef_key().as_slice());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"pw", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let reopened = FileVaultStore::open(t.store.paths().root()).expect("reopen");
    let vault = KeyVault::new(Arc::new(reopened), test_config(MutationPolicy::Queue))
        .expect("vault");
    let key = vault.open(&id, b"pw").await.expect("open");
    assert_eq!(key.expose(), deadbeef_key().as_slice());

    let info = vault.record_info(&id).await.expect("info");
    assert_eq!(info.version, 1);
    assert!(!info.needs_upgrade);
}

#[tokio::test]
async fn test_change_passphrase_flow() {
    let t = file_vault(MutationPolicy::Queue);
    let id = account("rAcct1");
    t.vault
        .create(&id, b"correct-horse", KeyMaterial::new(deadbeef_key()))
        .await
        .expect("create");

    let mismatch = PassphraseChange::new("correct-horse", "battery-staple", "battery-stapel");
    assert!(matches!(
        t.vault.change_passphrase(&id, &mismatch).await,
        Err(VaultError::InvalidInput(_))
    ));

    let wrong_current = PassphraseChange::new("incorrect", "battery-staple", "battery-staple");
    assert!(matches!(
        t.vault.change_passphrase(&id, &wrong_current).await,
        Err(VaultError::WrongPassphrase)
    ));

    let change = PassphraseChange::new("correct-horse", "battery-staple", "battery-staple");
    t.vault
        .change_passphrase(&id, &change)
        .await
        .expect("change passphrase");
    assert!(t.vault.open(&id, b"battery-staple").await.is_ok());
}
