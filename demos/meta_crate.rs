//! Example: Using the meta-crate (all backends)
//!
//! Run with: `cargo run --example meta_crate`
//!
//! The same function runs against every backend through [`LockProvider`].

use std::time::Duration;

use advisory_lock::*;

async fn restock<P: LockProvider>(label: &str, provider: &P) -> LockResult<()> {
    let lock = provider.create_lock("inventory-restock")?;
    if let Some(mut handle) = lock.try_acquire(Duration::ZERO).await? {
        println!("{label}: lock acquired");
        handle.release().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Example: Using advisory-lock meta-crate\n");

    println!("=== In-memory Backend ===");
    restock("memory", &InMemoryLockProvider::new()).await?;

    // PostgreSQL backend example (if available)
    if let Ok(postgres_url) = std::env::var("POSTGRES_URL") {
        println!("\n=== PostgreSQL Backend ===");
        if let Ok(provider) = PostgresLockProvider::new(postgres_url).await {
            restock("postgres", &provider).await?;
        }
    }

    // MySQL backend example (if available)
    if let Ok(mysql_url) = std::env::var("MYSQL_URL") {
        println!("\n=== MySQL Backend ===");
        if let Ok(provider) = MySqlLockProvider::new(mysql_url).await {
            restock("mysql", &provider).await?;
        }
    }

    println!("\nAll examples completed!");
    Ok(())
}
