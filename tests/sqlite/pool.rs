use std::time::{Duration, Instant};

use sturdy::{ConnectOptions, Database, Error, PoolOptions};

#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::Person;

#[tokio::test]
async fn exhausted_pool_times_out_and_recovers() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect_with(
        ConnectOptions::new("sqlite::memory:").pool_options(
            PoolOptions::new()
                .max_size(2)
                .acquire_timeout(Duration::from_secs(2)),
        ),
    )
    .await?;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let pool = db.pool().clone();
        tasks.push(tokio::spawn(async move {
            match pool.acquire().await {
                Ok(conn) => {
                    // hold the connection well past every waiter's deadline
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    drop(conn);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }));
    }

    let mut timeouts = 0;
    let mut successes = 0;
    for task in tasks {
        match task.await? {
            Ok(()) => successes += 1,
            Err(Error::PoolTimeout) => timeouts += 1,
            Err(other) => panic!("only PoolTimeout is acceptable, got {other}"),
        }
    }

    assert_eq!(successes + timeouts, 10);
    assert!(timeouts >= 6, "expected at least 6 timeouts, got {timeouts}");
    assert!(successes >= 2, "expected at least 2 successes, got {successes}");

    // the pool recovers immediately once the holders release
    let started = Instant::now();
    let conn = db.pool().acquire().await?;
    assert!(started.elapsed() < Duration::from_millis(500));
    drop(conn);

    Ok(())
}

#[tokio::test]
async fn statement_failures_do_not_leak_connections() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect_with(
        ConnectOptions::new("sqlite::memory:").pool_options(
            PoolOptions::new()
                .max_size(1)
                .acquire_timeout(Duration::from_millis(500)),
        ),
    )
    .await?;
    let people = db.repository::<Person>()?;
    people.initialize_table().await?;

    // a SQL error is not a transport error: the connection must come back
    for _ in 0..5 {
        let failed = people.execute_sql("UPDATE not_a_table SET x = 1", vec![]).await;
        assert!(failed.is_err());
    }

    let mut person = Person::new("Still", "Works", 40);
    people.create(&mut person).await?;
    assert_eq!(people.count(None).await?, 1);
    assert_eq!(db.pool().size(), 1);

    Ok(())
}

#[tokio::test]
async fn pool_reuses_connections_up_to_capacity() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect_with(
        ConnectOptions::new("sqlite::memory:")
            .pool_options(PoolOptions::new().min_size(1).max_size(3)),
    )
    .await?;

    assert_eq!(db.pool().size(), 1);
    assert_eq!(db.pool().num_idle(), 1);

    let a = db.pool().acquire().await?;
    let b = db.pool().acquire().await?;
    assert_eq!(db.pool().size(), 2);
    drop(a);
    drop(b);

    assert_eq!(db.pool().num_idle(), 2);

    // sequential acquires keep reusing the same connections
    for _ in 0..10 {
        drop(db.pool().acquire().await?);
    }
    assert_eq!(db.pool().size(), 2);

    Ok(())
}

#[tokio::test]
async fn closed_database_rejects_operations() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:").await?;
    let people = db.repository::<Person>()?;
    people.initialize_table().await?;

    db.close().await;

    match people.count(None).await {
        Err(Error::PoolClosed) => {}
        other => panic!("expected PoolClosed, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn misconfigured_pool_is_rejected() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let result = Database::connect_with(
        ConnectOptions::new("sqlite::memory:")
            .pool_options(PoolOptions::new().min_size(5).max_size(2)),
    )
    .await;

    match result {
        Err(Error::Configuration(message)) => assert!(message.contains("min_size")),
        other => panic!("expected Configuration, got {:?}", other.is_ok()),
    }

    Ok(())
}
