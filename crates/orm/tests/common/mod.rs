//! Shared fixtures: hand-written entity mappings in the shape a derive
//! would generate, plus backend helpers and relational test schema.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use tandem_orm::{
    Backend, ColumnSpec, Entity, MappingDescriptor, OrmError, OrmResult, Record,
    RelationDescriptor, RelationalBackend, Repository, Value, ValueKind,
};

/// Single-connection in-memory SQLite pool; one connection keeps every
/// statement on the same database.
pub async fn sqlite_backend() -> Arc<Backend> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool");
    Arc::new(Backend::Relational(RelationalBackend::from_pool(pool)))
}

pub fn document_backend() -> Arc<Backend> {
    Arc::new(Backend::documents())
}

/// The relational tests create their schema through the raw update
/// escape hatch; schema management is otherwise outside the engine.
pub async fn create_schema<T: Entity>(repository: &mut Repository<T>, statements: &[&str]) {
    for statement in statements {
        repository
            .execute_update(statement)
            .await
            .expect("schema statement");
    }
}

pub const CUSTOMER_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS customers (id INTEGER PRIMARY KEY AUTOINCREMENT, \
     name TEXT NOT NULL, age INTEGER, score REAL, active INTEGER)",
];

pub const LIBRARY_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS authors (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)",
    "CREATE TABLE IF NOT EXISTS books (id INTEGER PRIMARY KEY AUTOINCREMENT, \
     title TEXT, author_id INTEGER)",
];

pub const ACCOUNT_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT)",
    "CREATE TABLE IF NOT EXISTS profiles (id INTEGER PRIMARY KEY AUTOINCREMENT, \
     bio TEXT, user_id INTEGER)",
];

pub const BLOG_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS posts (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT)",
    "CREATE TABLE IF NOT EXISTS tags (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT)",
    "CREATE TABLE IF NOT EXISTS posts_tags (posts_id INTEGER, tags_id INTEGER)",
];

fn text_field(record: &Record, column: &str) -> String {
    record
        .value_or_null(column)
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn unknown_relation(collection: &str, attribute: &str) -> OrmError {
    OrmError::Mapping(format!("'{attribute}' is not a relation on '{collection}'"))
}

/// Flat entity for query-surface tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: Option<i64>,
    pub name: String,
    pub age: i64,
    pub score: f64,
    pub active: bool,
}

impl Customer {
    pub fn new(name: &str, age: i64, score: f64, active: bool) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age,
            score,
            active,
        }
    }
}

impl Entity for Customer {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("customers")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("name", ValueKind::Text).not_null().max_length(120))
            .column(ColumnSpec::new("age", ValueKind::Int))
            .column(ColumnSpec::new("score", ValueKind::Float))
            .column(ColumnSpec::new("active", ValueKind::Bool))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.clone())
            .with("age", self.age)
            .with("score", self.score)
            .with("active", self.active)
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.value_or_null("id").as_i64(),
            name: text_field(record, "name"),
            age: record.value_or_null("age").as_i64().unwrap_or_default(),
            score: record.value_or_null("score").as_f64().unwrap_or_default(),
            active: record.value_or_null("active").as_bool().unwrap_or_default(),
        })
    }

    fn identity_value(&self) -> Value {
        self.id.into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        Err(unknown_relation("customers", attribute))
    }

    fn apply_relation(&mut self, attribute: &str, _records: Vec<Record>) -> OrmResult<()> {
        Err(unknown_relation("customers", attribute))
    }
}

/// Owner side of an eager, cascading one-to-many.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
    pub books: Vec<Book>,
}

impl Author {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            books: Vec::new(),
        }
    }
}

impl Entity for Author {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("authors")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("name", ValueKind::Text))
            .relation(
                RelationDescriptor::one_to_many::<Book>("books")
                    .mapped_by("author")
                    .eager()
                    .cascade(),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.clone())
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.value_or_null("id").as_i64(),
            name: text_field(record, "name"),
            books: Vec::new(),
        })
    }

    fn identity_value(&self) -> Value {
        self.id.into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        match attribute {
            "books" => Ok(Some(self.books.iter().map(Entity::to_record).collect())),
            other => Err(unknown_relation("authors", other)),
        }
    }

    fn apply_relation(&mut self, attribute: &str, records: Vec<Record>) -> OrmResult<()> {
        match attribute {
            "books" => {
                self.books = records
                    .iter()
                    .map(Book::from_record)
                    .collect::<OrmResult<_>>()?;
                Ok(())
            }
            other => Err(unknown_relation("authors", other)),
        }
    }
}

/// Child side: owning many-to-one with an explicit foreign-key column.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub author_id: Option<i64>,
    pub author: Option<Author>,
}

impl Book {
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            author_id: None,
            author: None,
        }
    }
}

impl Entity for Book {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("books")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("title", ValueKind::Text))
            .column(ColumnSpec::new("author_id", ValueKind::Int))
            .relation(
                RelationDescriptor::many_to_one::<Author>("author")
                    .join_column("author_id")
                    .lazy(),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("title", self.title.clone())
            .with("author_id", self.author_id)
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.value_or_null("id").as_i64(),
            title: text_field(record, "title"),
            author_id: record.value_or_null("author_id").as_i64(),
            author: None,
        })
    }

    fn identity_value(&self) -> Value {
        self.id.into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        match attribute {
            "author" => Ok(self
                .author
                .as_ref()
                .map(|author| vec![author.to_record()])),
            other => Err(unknown_relation("books", other)),
        }
    }

    fn apply_relation(&mut self, attribute: &str, records: Vec<Record>) -> OrmResult<()> {
        match attribute {
            "author" => {
                self.author = records.first().map(Author::from_record).transpose()?;
                Ok(())
            }
            other => Err(unknown_relation("books", other)),
        }
    }
}

/// Inverse side of an eager, cascading one-to-one.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub id: Option<i64>,
    pub username: String,
    pub profile: Option<Profile>,
}

impl UserAccount {
    pub fn new(username: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            profile: None,
        }
    }
}

impl Entity for UserAccount {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("users")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("username", ValueKind::Text))
            .relation(
                RelationDescriptor::one_to_one::<Profile>("profile")
                    .mapped_by("user")
                    .eager()
                    .cascade(),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("username", self.username.clone())
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.value_or_null("id").as_i64(),
            username: text_field(record, "username"),
            profile: None,
        })
    }

    fn identity_value(&self) -> Value {
        self.id.into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        match attribute {
            "profile" => Ok(self
                .profile
                .as_ref()
                .map(|profile| vec![profile.to_record()])),
            other => Err(unknown_relation("users", other)),
        }
    }

    fn apply_relation(&mut self, attribute: &str, records: Vec<Record>) -> OrmResult<()> {
        match attribute {
            "profile" => {
                self.profile = records.first().map(Profile::from_record).transpose()?;
                Ok(())
            }
            other => Err(unknown_relation("users", other)),
        }
    }
}

/// Owning side of the one-to-one above: holds the foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: Option<i64>,
    pub bio: String,
    pub user_id: Option<i64>,
}

impl Profile {
    pub fn new(bio: &str) -> Self {
        Self {
            id: None,
            bio: bio.to_string(),
            user_id: None,
        }
    }
}

impl Entity for Profile {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("profiles")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("bio", ValueKind::Text))
            .column(ColumnSpec::new("user_id", ValueKind::Int))
            .relation(
                RelationDescriptor::many_to_one::<UserAccount>("user")
                    .join_column("user_id")
                    .lazy(),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("bio", self.bio.clone())
            .with("user_id", self.user_id)
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.value_or_null("id").as_i64(),
            bio: text_field(record, "bio"),
            user_id: record.value_or_null("user_id").as_i64(),
        })
    }

    fn identity_value(&self) -> Value {
        self.id.into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        match attribute {
            "user" => Ok(None),
            other => Err(unknown_relation("profiles", other)),
        }
    }

    fn apply_relation(&mut self, attribute: &str, _records: Vec<Record>) -> OrmResult<()> {
        match attribute {
            "user" => Ok(()),
            other => Err(unknown_relation("profiles", other)),
        }
    }
}

/// Many-to-many owner with an eager, cascading tag collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    pub tags: Vec<Tag>,
}

impl Post {
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            tags: Vec::new(),
        }
    }
}

impl Entity for Post {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("posts")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("title", ValueKind::Text))
            .relation(
                RelationDescriptor::many_to_many::<Tag>("tags")
                    .eager()
                    .cascade(),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("title", self.title.clone())
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.value_or_null("id").as_i64(),
            title: text_field(record, "title"),
            tags: Vec::new(),
        })
    }

    fn identity_value(&self) -> Value {
        self.id.into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        match attribute {
            "tags" => Ok(Some(self.tags.iter().map(Entity::to_record).collect())),
            other => Err(unknown_relation("posts", other)),
        }
    }

    fn apply_relation(&mut self, attribute: &str, records: Vec<Record>) -> OrmResult<()> {
        match attribute {
            "tags" => {
                self.tags = records
                    .iter()
                    .map(Tag::from_record)
                    .collect::<OrmResult<_>>()?;
                Ok(())
            }
            other => Err(unknown_relation("posts", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: String,
}

impl Tag {
    pub fn new(label: &str) -> Self {
        Self {
            id: None,
            label: label.to_string(),
        }
    }
}

impl Entity for Tag {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("tags")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("label", ValueKind::Text))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("label", self.label.clone())
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.value_or_null("id").as_i64(),
            label: text_field(record, "label"),
        })
    }

    fn identity_value(&self) -> Value {
        self.id.into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.id = value.as_i64();
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        Err(unknown_relation("tags", attribute))
    }

    fn apply_relation(&mut self, attribute: &str, _records: Vec<Record>) -> OrmResult<()> {
        Err(unknown_relation("tags", attribute))
    }
}

pub const API_KEY_SCHEMA: &[&str] =
    &["CREATE TABLE IF NOT EXISTS api_keys (token TEXT PRIMARY KEY, owner TEXT)"];

/// Text-identity entity: unset tokens are generated at insert.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKey {
    pub token: Option<String>,
    pub owner: String,
}

impl ApiKey {
    pub fn new(owner: &str) -> Self {
        Self {
            token: None,
            owner: owner.to_string(),
        }
    }
}

impl Entity for ApiKey {
    fn descriptor() -> MappingDescriptor {
        MappingDescriptor::new("api_keys")
            .identity(ColumnSpec::new("token", ValueKind::Text))
            .column(ColumnSpec::new("owner", ValueKind::Text))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("token", self.token.clone())
            .with("owner", self.owner.clone())
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            token: record
                .value_or_null("token")
                .as_str()
                .map(str::to_string),
            owner: text_field(record, "owner"),
        })
    }

    fn identity_value(&self) -> Value {
        self.token.clone().into()
    }

    fn set_identity_value(&mut self, value: Value) {
        self.token = value.as_str().map(str::to_string);
    }

    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>> {
        Err(unknown_relation("api_keys", attribute))
    }

    fn apply_relation(&mut self, attribute: &str, _records: Vec<Record>) -> OrmResult<()> {
        Err(unknown_relation("api_keys", attribute))
    }
}

/// Seed the five-customer data set the query tests share.
pub async fn seed_customers(repository: &mut Repository<Customer>) {
    for customer in [
        Customer::new("Alice", 25, 85.5, true),
        Customer::new("Bob", 30, 90.0, true),
        Customer::new("Charlie", 35, 75.5, false),
        Customer::new("Diana", 28, 95.0, true),
        Customer::new("Eve", 22, 88.5, false),
    ] {
        let mut customer = customer;
        repository.save(&mut customer).await.expect("seed customer");
    }
}
