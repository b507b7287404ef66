//! Catalog business logic - Books and the names they hang off.
//!
//! Authors, publishers and books are upserted by natural key (name or ISBN)
//! when a restocking invoice mentions them for the first time. The upserts
//! take no locks: two concurrent first-time inserts of the same name resolve
//! through the unique index, and the loser simply reads the winner's row.

use crate::{
    core::pagination::{Page, PageArgs, paginate},
    entities::{Author, Book, Publisher, Vendor, author, book, publisher, vendor},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*, sea_query::OnConflict};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Descriptive fields needed to create a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDetails {
    /// ISBN-10 or ISBN-13, hyphens and spaces allowed
    pub isbn: String,
    /// Title as printed
    pub title: String,
    /// Author name; created if unknown
    pub author: String,
    /// Publisher name; created if unknown
    pub publisher: String,
    /// Retail price in cents
    pub retail_price: i64,
}

/// Strips separators from an ISBN and checks it is a 10 or 13 character ISBN.
pub fn normalize_isbn(raw: &str) -> Result<String> {
    let isbn: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();

    let valid = match isbn.len() {
        13 => isbn.chars().all(|c| c.is_ascii_digit()),
        10 => isbn
            .char_indices()
            .all(|(i, c)| c.is_ascii_digit() || (i == 9 && c == 'X')),
        _ => false,
    };

    if valid {
        Ok(isbn)
    } else {
        Err(Error::validation(format!("Invalid ISBN '{raw}'")))
    }
}

fn clean_name(kind: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{kind} name cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Creates an author. Fails if the name is taken.
pub async fn create_author(db: &DatabaseConnection, name: &str) -> Result<author::Model> {
    let name = clean_name("Author", name)?;
    author::ActiveModel {
        name: Set(name),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a publisher. Fails if the name is taken.
pub async fn create_publisher(db: &DatabaseConnection, name: &str) -> Result<publisher::Model> {
    let name = clean_name("Publisher", name)?;
    publisher::ActiveModel {
        name: Set(name),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a vendor. Fails if the name is taken.
pub async fn create_vendor(db: &DatabaseConnection, name: &str) -> Result<vendor::Model> {
    let name = clean_name("Vendor", name)?;
    vendor::ActiveModel {
        name: Set(name),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Returns the author with this name, creating it if needed.
pub async fn upsert_author_by_name<C>(db: &C, name: &str) -> Result<author::Model>
where
    C: ConnectionTrait,
{
    let name = clean_name("Author", name)?;
    Author::insert(author::ActiveModel {
        name: Set(name.clone()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(author::Column::Name)
            .do_nothing()
            .to_owned(),
    )
    .do_nothing()
    .exec(db)
    .await?;

    Author::find()
        .filter(author::Column::Name.eq(name.as_str()))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Author", name))
}

/// Returns the publisher with this name, creating it if needed.
pub async fn upsert_publisher_by_name<C>(db: &C, name: &str) -> Result<publisher::Model>
where
    C: ConnectionTrait,
{
    let name = clean_name("Publisher", name)?;
    Publisher::insert(publisher::ActiveModel {
        name: Set(name.clone()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(publisher::Column::Name)
            .do_nothing()
            .to_owned(),
    )
    .do_nothing()
    .exec(db)
    .await?;

    Publisher::find()
        .filter(publisher::Column::Name.eq(name.as_str()))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Publisher", name))
}

/// Returns the book with this ISBN, creating it (and its author and
/// publisher) with zero stock if it has never been seen.
///
/// An existing book is returned untouched; its price is not overwritten.
pub async fn upsert_book_by_isbn<C>(db: &C, details: &BookDetails) -> Result<book::Model>
where
    C: ConnectionTrait,
{
    let isbn = normalize_isbn(&details.isbn)?;

    if let Some(existing) = Book::find()
        .filter(book::Column::Isbn.eq(isbn.as_str()))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    if details.retail_price < 0 {
        return Err(Error::validation("Retail price cannot be negative"));
    }

    let author = upsert_author_by_name(db, &details.author).await?;
    let publisher = upsert_publisher_by_name(db, &details.publisher).await?;

    debug!(isbn = %isbn, "Creating book from invoice details");
    book::ActiveModel {
        isbn: Set(isbn),
        title: Set(details.title.trim().to_string()),
        author_id: Set(author.id),
        publisher_id: Set(publisher.id),
        retail_price: Set(details.retail_price),
        quantity: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a book with an initial stock level.
pub async fn create_book(
    db: &DatabaseConnection,
    details: &BookDetails,
    initial_quantity: i64,
) -> Result<book::Model> {
    let isbn = normalize_isbn(&details.isbn)?;
    if details.retail_price < 0 {
        return Err(Error::validation("Retail price cannot be negative"));
    }
    if details.title.trim().is_empty() {
        return Err(Error::validation("Book title cannot be empty"));
    }

    let author = upsert_author_by_name(db, &details.author).await?;
    let publisher = upsert_publisher_by_name(db, &details.publisher).await?;

    book::ActiveModel {
        isbn: Set(isbn),
        title: Set(details.title.trim().to_string()),
        author_id: Set(author.id),
        publisher_id: Set(publisher.id),
        retail_price: Set(details.retail_price),
        quantity: Set(initial_quantity),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Looks up a book by id.
pub async fn get_book_by_id(db: &DatabaseConnection, book_id: i64) -> Result<Option<book::Model>> {
    Book::find_by_id(book_id).one(db).await.map_err(Into::into)
}

/// Looks up a book by ISBN after normalising it.
pub async fn get_book_by_isbn(db: &DatabaseConnection, isbn: &str) -> Result<Option<book::Model>> {
    let isbn = normalize_isbn(isbn)?;
    Book::find()
        .filter(book::Column::Isbn.eq(isbn))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists books, oldest first.
pub async fn list_books(db: &DatabaseConnection, args: &PageArgs) -> Result<Page<book::Model>> {
    paginate(db, Book::find(), book::Column::Id, args).await
}

/// Lists vendors, oldest first.
pub async fn list_vendors(db: &DatabaseConnection, args: &PageArgs) -> Result<Page<vendor::Model>> {
    paginate(db, Vendor::find(), vendor::Column::Id, args).await
}
