use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::account::{AccountStore, Authenticator, NumberAllocator, RocksAccountStore};
use crate::api::ApiServer;
use crate::config::DepositoryConfig;
use crate::service::LedgerService;
use crate::storage::Storage;
use crate::transfer::TransferEngine;

/// Wire storage, engine and service together and serve until ctrl-c.
pub async fn serve(config: DepositoryConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.auth.sign_key == crate::config::AuthConfig::default().sign_key {
        warn!("using the default JWT signing key, set DEPOSITORY_JWT_SECRET");
    }

    let storage = Arc::new(Storage::open(&config.storage.db_path, config.storage.lock_timeout_ms)?);
    let store: Arc<dyn AccountStore> = Arc::new(RocksAccountStore::new(storage));
    let engine = Arc::new(TransferEngine::new(
        store.clone(),
        config.transfer.retry_policy(),
    ));
    let authenticator = Arc::new(Authenticator::new(
        &config.auth.sign_key,
        config.auth.access_ttl_secs,
        config.auth.refresh_ttl_secs,
    ));
    let ledger = LedgerService::new(
        store,
        engine,
        NumberAllocator::default(),
        authenticator,
        config.transfer.deadline(),
    );

    info!(db_path = %config.storage.db_path, "ledger ready");
    ApiServer::new(ledger, config.server.listen_addr).start().await?;
    Ok(())
}

pub fn wipe(db_path: &str) -> std::io::Result<()> {
    if Path::new(db_path).exists() {
        std::fs::remove_dir_all(db_path)?;
        info!("removed {}", db_path);
    } else {
        info!("nothing to remove at {}", db_path);
    }
    Ok(())
}
