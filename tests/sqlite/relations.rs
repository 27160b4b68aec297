use sturdy::{col, Error};

#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::{library_db, Author, Book, BookTag, Tag};

async fn seed_library(db: &sturdy::Database) -> anyhow::Result<(Author, Vec<Book>, Vec<Tag>)> {
    let authors = db.repository::<Author>()?;
    let books = db.repository::<Book>()?;
    let tags = db.repository::<Tag>()?;
    let links = db.repository::<BookTag>()?;

    let mut orwell = Author::new("George Orwell");
    authors.create(&mut orwell).await?;

    let mut nineteen = Book::new("1984", orwell.id);
    books.create(&mut nineteen).await?;
    let mut farm = Book::new("Animal Farm", orwell.id);
    books.create(&mut farm).await?;

    let mut dystopia = Tag::new("dystopia");
    tags.create(&mut dystopia).await?;
    let mut classic = Tag::new("classic");
    tags.create(&mut classic).await?;

    for (book_id, tag_id) in [
        (nineteen.id, dystopia.id),
        (nineteen.id, classic.id),
        (farm.id, classic.id),
    ] {
        let mut link = BookTag::new(book_id, tag_id);
        links.create(&mut link).await?;
    }

    Ok((orwell, vec![nineteen, farm], vec![dystopia, classic]))
}

#[tokio::test]
async fn to_one_include_folds_into_the_root_statement() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let (orwell, _, _) = seed_library(&db).await?;
    let books = db.repository::<Book>()?;

    let before = books.statements_executed();
    let loaded = books
        .query()
        .filter(col("Title").eq("1984"))
        .include("author")
        .fetch_all()
        .await?;
    let statements = books.statements_executed() - before;

    assert_eq!(loaded.len(), 1);
    let author = loaded[0].author.as_ref().expect("author loaded");
    assert_eq!(author.name, "George Orwell");
    assert_eq!(author.id, orwell.id);
    assert!(statements <= 2, "used {statements} statements");

    Ok(())
}

#[tokio::test]
async fn to_many_include_stitches_children() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let (orwell, _, _) = seed_library(&db).await?;
    let authors = db.repository::<Author>()?;

    let mut lonely = Author::new("No Books");
    authors.create(&mut lonely).await?;

    let before = authors.statements_executed();
    let loaded = authors
        .query()
        .include("books")
        .order_by(col("Id"))
        .fetch_all()
        .await?;
    let statements = authors.statements_executed() - before;

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, orwell.id);
    let mut titles: Vec<&str> = loaded[0].books.iter().map(|b| b.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, ["1984", "Animal Farm"]);
    assert!(loaded[1].books.is_empty());

    // one root select plus one follow-up, independent of author count
    assert_eq!(statements, 2);

    Ok(())
}

#[tokio::test]
async fn many_to_many_goes_through_the_link_entity() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    seed_library(&db).await?;
    let books = db.repository::<Book>()?;

    let loaded = books
        .query()
        .include("tags")
        .order_by(col("Title"))
        .fetch_all()
        .await?;

    assert_eq!(loaded.len(), 2);
    // "1984" sorts first
    let mut tags: Vec<&str> = loaded[0].tags.iter().map(|t| t.name.as_str()).collect();
    tags.sort_unstable();
    assert_eq!(tags, ["classic", "dystopia"]);
    assert_eq!(loaded[1].tags.len(), 1);
    assert_eq!(loaded[1].tags[0].name, "classic");

    Ok(())
}

#[tokio::test]
async fn then_include_loads_depth_first_within_budget() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    seed_library(&db).await?;
    let authors = db.repository::<Author>()?;

    let before = authors.statements_executed();
    let loaded = authors
        .query()
        .filter(col("Name").eq("George Orwell"))
        .include("books")
        .then_include("tags")
        .fetch_all()
        .await?;
    let statements = authors.statements_executed() - before;

    assert_eq!(loaded.len(), 1);
    let books = &loaded[0].books;
    assert_eq!(books.len(), 2);
    for book in books {
        assert!(!book.tags.is_empty(), "tags loaded for `{}`", book.title);
    }

    // width 1, depth 2: at most W*D + 1 = 3 statements
    assert!(statements <= 3, "used {statements} statements");

    Ok(())
}

#[tokio::test]
async fn include_on_empty_result_issues_no_followups() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let authors = db.repository::<Author>()?;

    let before = authors.statements_executed();
    let loaded = authors
        .query()
        .filter(col("Name").eq("Nobody"))
        .include("books")
        .fetch_all()
        .await?;
    let statements = authors.statements_executed() - before;

    assert!(loaded.is_empty());
    assert_eq!(statements, 1);

    Ok(())
}

#[tokio::test]
async fn unknown_navigation_is_invalid_state() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let authors = db.repository::<Author>()?;

    match authors.query().include("ghosts").fetch_all().await {
        Err(Error::InvalidState(message)) => assert!(message.contains("ghosts")),
        other => panic!("expected InvalidState, got {:?}", other.is_ok()),
    }

    match authors.query().then_include("books").fetch_all().await {
        Err(Error::InvalidState(_)) => {}
        other => panic!("expected InvalidState, got {:?}", other.is_ok()),
    }

    Ok(())
}

#[tokio::test]
async fn includes_ride_a_supplied_transaction() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let authors = db.repository::<Author>()?;
    let books = db.repository::<Book>()?;

    let mut tx = db.begin_transaction().await?;
    let mut author = Author::new("Tx Author");
    authors.create_in(&mut tx, &mut author).await?;
    let mut book = Book::new("Tx Book", author.id);
    books.create_in(&mut tx, &mut book).await?;

    // uncommitted rows are visible on the transaction's own connection
    let loaded = authors
        .query()
        .filter(col("Id").eq(author.id))
        .include("books")
        .fetch_all_in(&mut tx)
        .await?;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].books.len(), 1);

    tx.rollback().await?;
    assert!(authors.read_by_id(author.id).await?.is_none());

    Ok(())
}
