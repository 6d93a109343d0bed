//! Cascade propagation: save-before-owner, delete-before-owner, and
//! the full-replace join-table sync.

mod common;

use std::sync::Arc;

use common::*;
use tandem_orm::{Backend, Repository};

async fn blog(backend: &Arc<Backend>) -> (Repository<Post>, Repository<Tag>) {
    let mut posts = Repository::new(backend.clone());
    let tags = Repository::new(backend.clone());
    if backend.is_relational() {
        create_schema(&mut posts, BLOG_SCHEMA).await;
    }
    (posts, tags)
}

#[tokio::test]
async fn cascade_save_persists_related_entities_first() {
    let backend = sqlite_backend().await;
    let mut authors: Repository<Author> = Repository::new(backend.clone());
    let mut books: Repository<Book> = Repository::new(backend.clone());
    create_schema(&mut authors, LIBRARY_SCHEMA).await;

    let mut author = Author::new("Pratchett");
    author.books = vec![Book::new("Mort"), Book::new("Guards! Guards!")];
    authors.save(&mut author).await.unwrap();

    // Generated identities were written back into the owner's graph.
    assert!(author.books.iter().all(|b| b.id.is_some()));
    assert_eq!(books.find_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn cascade_save_on_update_backfills_the_foreign_key() {
    let backend = sqlite_backend().await;
    let mut authors: Repository<Author> = Repository::new(backend.clone());
    create_schema(&mut authors, LIBRARY_SCHEMA).await;

    let mut author = Author::new("Woolf");
    authors.save(&mut author).await.unwrap();
    let author_id = author.id.unwrap();

    author.books = vec![Book::new("Orlando"), Book::new("The Waves")];
    authors.save(&mut author).await.unwrap();

    assert!(author.books.iter().all(|b| b.author_id == Some(author_id)));
    let reloaded = authors.find_by_id(author_id).await.unwrap().unwrap();
    assert_eq!(reloaded.books.len(), 2);
}

#[tokio::test]
async fn cascade_delete_removes_owner_and_children() {
    let backend = sqlite_backend().await;
    let mut authors: Repository<Author> = Repository::new(backend.clone());
    let mut books: Repository<Book> = Repository::new(backend.clone());
    create_schema(&mut authors, LIBRARY_SCHEMA).await;

    let mut author = Author::new("Herbert");
    authors.save(&mut author).await.unwrap();
    author.books = vec![Book::new("Dune"), Book::new("Dune Messiah")];
    authors.save(&mut author).await.unwrap();

    let loaded = authors
        .find_by_id(author.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    authors.delete(&loaded).await.unwrap();

    assert!(authors.find_all().await.unwrap().is_empty());
    assert!(books.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn cascading_one_to_one_deletes_the_related_row() {
    let backend = sqlite_backend().await;
    let mut users: Repository<UserAccount> = Repository::new(backend.clone());
    let mut profiles: Repository<Profile> = Repository::new(backend.clone());
    create_schema(&mut users, ACCOUNT_SCHEMA).await;

    let mut user = UserAccount::new("grace");
    users.save(&mut user).await.unwrap();
    user.profile = Some(Profile::new("rear admiral"));
    users.save(&mut user).await.unwrap();

    assert_eq!(profiles.find_all().await.unwrap().len(), 1);

    let loaded = users.find_by_id(user.id.unwrap()).await.unwrap().unwrap();
    users.delete(&loaded).await.unwrap();
    assert!(users.find_all().await.unwrap().is_empty());
    assert!(profiles.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn many_to_many_sync_is_a_full_replace() {
    let backend = sqlite_backend().await;
    let (mut posts, mut tags) = blog(&backend).await;

    let mut post = Post::new("release notes");
    post.tags = vec![Tag::new("rust"), Tag::new("database")];
    posts.save(&mut post).await.unwrap();
    let post_id = post.id.unwrap();

    let loaded = posts.find_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(loaded.tags.len(), 2);

    // Replacing the collection replaces the links.
    post.tags = vec![Tag::new("announcement")];
    posts.save(&mut post).await.unwrap();
    let loaded = posts.find_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(loaded.tags.len(), 1);
    assert_eq!(loaded.tags[0].label, "announcement");

    // Target entities from earlier links are still stored.
    assert_eq!(tags.find_all().await.unwrap().len(), 3);

    // An empty collection clears every link.
    post.tags.clear();
    posts.save(&mut post).await.unwrap();
    let loaded = posts.find_by_id(post_id).await.unwrap().unwrap();
    assert!(loaded.tags.is_empty());
    assert_eq!(tags.find_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn many_to_many_cascade_delete_spares_the_targets() {
    let backend = sqlite_backend().await;
    let (mut posts, mut tags) = blog(&backend).await;

    let mut post = Post::new("farewell");
    post.tags = vec![Tag::new("meta"), Tag::new("archive")];
    posts.save(&mut post).await.unwrap();
    let post_id = post.id.unwrap();

    let loaded = posts.find_by_id(post_id).await.unwrap().unwrap();
    posts.delete(&loaded).await.unwrap();

    assert!(posts.find_all().await.unwrap().is_empty());
    // Join rows are gone; the tags themselves survive.
    assert_eq!(tags.find_all().await.unwrap().len(), 2);
    let mut fresh = Post::new("fresh");
    posts.save(&mut fresh).await.unwrap();
    let fresh = posts.find_by_id(fresh.id.unwrap()).await.unwrap().unwrap();
    assert!(fresh.tags.is_empty());
}

#[tokio::test]
async fn document_backend_cascades_identically() {
    let backend = document_backend();
    let (mut posts, mut tags) = blog(&backend).await;

    let mut post = Post::new("doc post");
    post.tags = vec![Tag::new("a"), Tag::new("b")];
    posts.save(&mut post).await.unwrap();
    let post_id = post.id.unwrap();

    let loaded = posts.find_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(loaded.tags.len(), 2);

    posts.delete(&loaded).await.unwrap();
    assert!(posts.find_all().await.unwrap().is_empty());
    assert_eq!(tags.find_all().await.unwrap().len(), 2);
}
