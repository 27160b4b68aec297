//! Shared test entities, implemented by hand the way a caller of the engine
//! would.

#![allow(dead_code)]

use std::any::Any;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use sturdy::{
    col, downcast_children, encode_enum, ColumnMeta, Database, Entity, EntityMeta, EnumCodec,
    EnumRepr, Error, FromValue, IndexMeta, LogicalType, Result, Row, Value, VersionRole,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Suspended,
    Retired,
}

impl EnumCodec for AccountStatus {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("Active", AccountStatus::Active),
        ("Suspended", AccountStatus::Suspended),
        ("Retired", AccountStatus::Retired),
    ];

    fn index(&self) -> i64 {
        match self {
            AccountStatus::Active => 0,
            AccountStatus::Suspended => 1,
            AccountStatus::Retired => 2,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AccountStatus::Active => "Active",
            AccountStatus::Suspended => "Suspended",
            AccountStatus::Retired => "Retired",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub email: Option<String>,
    pub salary: Decimal,
    pub department: String,
    pub status: AccountStatus,
    pub badge: Uuid,
    pub hired_at: DateTime<Utc>,
    pub tenure: Duration,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str, age: i32) -> Self {
        Person {
            id: 0,
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            age,
            email: None,
            salary: Decimal::ZERO,
            department: "Unassigned".to_owned(),
            status: AccountStatus::Active,
            badge: Uuid::nil(),
            hired_at: Utc.with_ymd_and_hms(2020, 1, 1, 9, 0, 0).unwrap(),
            tenure: Duration::zero(),
        }
    }
}

impl Entity for Person {
    fn meta() -> &'static EntityMeta {
        static META: OnceLock<EntityMeta> = OnceLock::new();
        META.get_or_init(|| {
            EntityMeta::builder("Person", "people")
                .column(ColumnMeta::new("Id", LogicalType::Long).primary_key().auto_increment())
                .column(ColumnMeta::new("FirstName", LogicalType::text(100)))
                .column(ColumnMeta::new("LastName", LogicalType::text(100)))
                .column(ColumnMeta::new("Age", LogicalType::Int))
                .column(ColumnMeta::new("Email", LogicalType::text(255)).nullable())
                .column(ColumnMeta::new(
                    "Salary",
                    LogicalType::Decimal {
                        precision: 12,
                        scale: 2,
                    },
                ))
                .column(ColumnMeta::new("Department", LogicalType::text(100)))
                .column(ColumnMeta::new("Status", LogicalType::Enum(EnumRepr::Text)))
                .column(ColumnMeta::new("Badge", LogicalType::Guid))
                .column(ColumnMeta::new("HiredAt", LogicalType::DateTime))
                .column(ColumnMeta::new("Tenure", LogicalType::Interval))
                .index(IndexMeta::new("ix_people_department", ["Department"]))
                .index(IndexMeta::new("ix_people_name", ["LastName", "FirstName"]))
                .build::<Person>()
                .expect("person metadata")
        })
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Person {
            id: row.try_get("Id")?,
            first_name: row.try_get("FirstName")?,
            last_name: row.try_get("LastName")?,
            age: row.try_get("Age")?,
            email: row.try_get("Email")?,
            salary: row.try_get("Salary")?,
            department: row.try_get("Department")?,
            status: row.try_get_enum("Status")?,
            badge: row.try_get("Badge")?,
            hired_at: row.try_get("HiredAt")?,
            tenure: row.try_get("Tenure")?,
        })
    }

    fn value_of(&self, column: &str) -> Option<Value> {
        match column {
            "Id" => Some(Value::Int(self.id)),
            "FirstName" => Some(Value::Text(self.first_name.clone())),
            "LastName" => Some(Value::Text(self.last_name.clone())),
            "Age" => Some(Value::Int(self.age as i64)),
            "Email" => Some(match &self.email {
                Some(email) => Value::Text(email.clone()),
                None => Value::Null,
            }),
            "Salary" => Some(Value::Decimal(self.salary)),
            "Department" => Some(Value::Text(self.department.clone())),
            "Status" => Some(encode_enum(self.status, EnumRepr::Text)),
            "Badge" => Some(Value::Guid(self.badge)),
            "HiredAt" => Some(Value::DateTime(self.hired_at)),
            "Tenure" => Some(Value::Interval(self.tenure)),
            _ => None,
        }
    }

    fn put(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "Id" => self.id = i64::from_value(&value)?,
            other => {
                return Err(Error::InvalidState(
                    format!("unexpected writeback to column `{other}`").into_boxed_str(),
                ))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub version: i64,
    pub books: Vec<Book>,
}

impl Author {
    pub fn new(name: &str) -> Self {
        Author {
            name: name.to_owned(),
            ..Author::default()
        }
    }
}

impl Entity for Author {
    fn meta() -> &'static EntityMeta {
        static META: OnceLock<EntityMeta> = OnceLock::new();
        META.get_or_init(|| {
            EntityMeta::builder("Author", "authors")
                .column(ColumnMeta::new("Id", LogicalType::Long).primary_key().auto_increment())
                .column(ColumnMeta::new("Name", LogicalType::text(200)))
                .column(ColumnMeta::new("Version", LogicalType::Long).version(VersionRole::Integer))
                .has_many("books", "AuthorId", Book::meta)
                .build::<Author>()
                .expect("author metadata")
        })
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Author {
            id: row.try_get("Id")?,
            name: row.try_get("Name")?,
            version: row.try_get("Version")?,
            books: Vec::new(),
        })
    }

    fn value_of(&self, column: &str) -> Option<Value> {
        match column {
            "Id" => Some(Value::Int(self.id)),
            "Name" => Some(Value::Text(self.name.clone())),
            "Version" => Some(Value::Int(self.version)),
            _ => None,
        }
    }

    fn put(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "Id" => self.id = i64::from_value(&value)?,
            "Version" => self.version = i64::from_value(&value)?,
            other => {
                return Err(Error::InvalidState(
                    format!("unexpected writeback to column `{other}`").into_boxed_str(),
                ))
            }
        }
        Ok(())
    }

    fn attach(&mut self, nav: &str, children: Vec<Box<dyn Any + Send>>) -> Result<()> {
        match nav {
            "books" => {
                self.books = downcast_children::<Book>(children)?;
                Ok(())
            }
            other => Err(Error::InvalidState(
                format!("author has no navigation `{other}`").into_boxed_str(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub author: Option<Author>,
    pub tags: Vec<Tag>,
}

impl Book {
    pub fn new(title: &str, author_id: i64) -> Self {
        Book {
            title: title.to_owned(),
            author_id,
            ..Book::default()
        }
    }
}

impl Entity for Book {
    fn meta() -> &'static EntityMeta {
        static META: OnceLock<EntityMeta> = OnceLock::new();
        META.get_or_init(|| {
            EntityMeta::builder("Book", "books")
                .column(ColumnMeta::new("Id", LogicalType::Long).primary_key().auto_increment())
                .column(ColumnMeta::new("Title", LogicalType::text(200)))
                .column(
                    ColumnMeta::new("AuthorId", LogicalType::Long).references("authors", "Id"),
                )
                .belongs_to("author", "AuthorId", Author::meta)
                .many_to_many("tags", BookTag::meta, "BookId", "TagId", Tag::meta)
                .build::<Book>()
                .expect("book metadata")
        })
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Book {
            id: row.try_get("Id")?,
            title: row.try_get("Title")?,
            author_id: row.try_get("AuthorId")?,
            author: None,
            tags: Vec::new(),
        })
    }

    fn value_of(&self, column: &str) -> Option<Value> {
        match column {
            "Id" => Some(Value::Int(self.id)),
            "Title" => Some(Value::Text(self.title.clone())),
            "AuthorId" => Some(Value::Int(self.author_id)),
            _ => None,
        }
    }

    fn put(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "Id" => self.id = i64::from_value(&value)?,
            other => {
                return Err(Error::InvalidState(
                    format!("unexpected writeback to column `{other}`").into_boxed_str(),
                ))
            }
        }
        Ok(())
    }

    fn attach(&mut self, nav: &str, children: Vec<Box<dyn Any + Send>>) -> Result<()> {
        match nav {
            "author" => {
                self.author = downcast_children::<Author>(children)?.pop();
                Ok(())
            }
            "tags" => {
                self.tags = downcast_children::<Tag>(children)?;
                Ok(())
            }
            other => Err(Error::InvalidState(
                format!("book has no navigation `{other}`").into_boxed_str(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Tag {
            id: 0,
            name: name.to_owned(),
        }
    }
}

impl Entity for Tag {
    fn meta() -> &'static EntityMeta {
        static META: OnceLock<EntityMeta> = OnceLock::new();
        META.get_or_init(|| {
            EntityMeta::builder("Tag", "tags")
                .column(ColumnMeta::new("Id", LogicalType::Long).primary_key().auto_increment())
                .column(ColumnMeta::new("Name", LogicalType::text(100)))
                .index(IndexMeta::new("ix_tags_name", ["Name"]).unique())
                .build::<Tag>()
                .expect("tag metadata")
        })
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Tag {
            id: row.try_get("Id")?,
            name: row.try_get("Name")?,
        })
    }

    fn value_of(&self, column: &str) -> Option<Value> {
        match column {
            "Id" => Some(Value::Int(self.id)),
            "Name" => Some(Value::Text(self.name.clone())),
            _ => None,
        }
    }

    fn put(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "Id" => self.id = i64::from_value(&value)?,
            other => {
                return Err(Error::InvalidState(
                    format!("unexpected writeback to column `{other}`").into_boxed_str(),
                ))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BookTag {
    pub id: i64,
    pub book_id: i64,
    pub tag_id: i64,
}

impl BookTag {
    pub fn new(book_id: i64, tag_id: i64) -> Self {
        BookTag {
            id: 0,
            book_id,
            tag_id,
        }
    }
}

impl Entity for BookTag {
    fn meta() -> &'static EntityMeta {
        static META: OnceLock<EntityMeta> = OnceLock::new();
        META.get_or_init(|| {
            EntityMeta::builder("BookTag", "book_tags")
                .column(ColumnMeta::new("Id", LogicalType::Long).primary_key().auto_increment())
                .column(ColumnMeta::new("BookId", LogicalType::Long).references("books", "Id"))
                .column(ColumnMeta::new("TagId", LogicalType::Long).references("tags", "Id"))
                .build::<BookTag>()
                .expect("book-tag metadata")
        })
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(BookTag {
            id: row.try_get("Id")?,
            book_id: row.try_get("BookId")?,
            tag_id: row.try_get("TagId")?,
        })
    }

    fn value_of(&self, column: &str) -> Option<Value> {
        match column {
            "Id" => Some(Value::Int(self.id)),
            "BookId" => Some(Value::Int(self.book_id)),
            "TagId" => Some(Value::Int(self.tag_id)),
            _ => None,
        }
    }

    fn put(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "Id" => self.id = i64::from_value(&value)?,
            other => {
                return Err(Error::InvalidState(
                    format!("unexpected writeback to column `{other}`").into_boxed_str(),
                ))
            }
        }
        Ok(())
    }
}

/// A fresh in-memory database with every fixture table created.
pub async fn library_db() -> Result<Database> {
    let db = Database::connect("sqlite::memory:").await?;
    db.repository::<Author>()?.initialize_table().await?;
    db.repository::<Book>()?.initialize_table().await?;
    db.repository::<Tag>()?.initialize_table().await?;
    db.repository::<BookTag>()?.initialize_table().await?;
    Ok(db)
}

pub async fn people_db() -> Result<Database> {
    let db = Database::connect("sqlite::memory:").await?;
    db.repository::<Person>()?.initialize_table().await?;
    Ok(db)
}

/// The unfiltered `Age > 40` predicate used by several tests.
pub fn older_than(age: i32) -> sturdy::Expr {
    col("Age").gt(age)
}
