use anyhow::Result;

use fedimapper_core::config::AppConfig;
use fedimapper_storage::Storage;

pub async fn run(config: AppConfig) -> Result<()> {
    let storage = Storage::new(&config.database.url, config.database.bulk_insert_buffer).await?;
    storage.vacuum().await?;
    let instances = storage.instance_count().await?;
    println!("Vacuum complete. {instances} instances tracked.");
    Ok(())
}
