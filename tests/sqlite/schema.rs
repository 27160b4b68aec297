use sturdy::{col, Database};

#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::{Person, Tag};

#[tokio::test]
async fn initialize_is_idempotent_and_validates() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:").await?;
    let people = db.repository::<Person>()?;

    people.initialize_table().await?;
    people.initialize_table().await?;

    let report = people.validate_table().await?;
    assert!(report.valid, "errors: {:?}", report.errors);
    assert!(report.errors.is_empty());

    Ok(())
}

#[tokio::test]
async fn validation_reports_a_missing_table() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:").await?;
    let people = db.repository::<Person>()?;

    let report = people.validate_table().await?;
    assert!(!report.valid);
    assert!(report.errors[0].contains("does not exist"));

    Ok(())
}

#[tokio::test]
async fn validation_reports_structural_divergence() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:").await?;
    let people = db.repository::<Person>()?;

    // a hand-rolled table missing most declared columns, plus a stray one
    people
        .execute_sql(
            "CREATE TABLE people (Id INTEGER PRIMARY KEY AUTOINCREMENT, FirstName TEXT, Stray TEXT)",
            vec![],
        )
        .await?;

    let report = people.validate_table().await?;
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("`LastName`")));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("undeclared column `Stray`")));

    Ok(())
}

#[tokio::test]
async fn index_lifecycle() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:").await?;
    let people = db.repository::<Person>()?;
    people.initialize_table().await?;

    let mut indexes = people.get_indexes().await?;
    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(indexes.len(), 2);
    assert_eq!(indexes[0].name, "ix_people_department");
    assert_eq!(indexes[0].columns, ["Department"]);
    assert!(!indexes[0].unique);
    // composite index columns keep their declared order
    assert_eq!(indexes[1].columns, ["LastName", "FirstName"]);

    people.drop_index("ix_people_department").await?;
    assert_eq!(people.get_indexes().await?.len(), 1);

    // create_indexes restores the dropped one
    people.create_indexes().await?;
    assert_eq!(people.get_indexes().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn unique_index_is_created_unique() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:").await?;
    let tags = db.repository::<Tag>()?;
    tags.initialize_table().await?;

    let indexes = tags.get_indexes().await?;
    assert_eq!(indexes.len(), 1);
    assert!(indexes[0].unique);

    Ok(())
}

#[tokio::test]
async fn unordered_paging_is_flagged_in_diagnostics() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:").await?;
    let people = db.repository::<Person>()?;
    people.initialize_table().await?;

    assert_eq!(people.last_diagnostic(), None);

    people.query().take(5).fetch_all().await?;
    let note = people.last_diagnostic().expect("note recorded");
    assert!(note.contains("order"));

    // ordered paging leaves no note behind
    let ordered = db.repository::<Person>()?;
    ordered
        .query()
        .order_by(col("Id"))
        .take(5)
        .fetch_all()
        .await?;
    assert_eq!(ordered.last_diagnostic(), None);

    Ok(())
}
