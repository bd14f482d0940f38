//! Benchmarks for the record transform.

use books_migrate::transform_book;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mongodb::bson::{Document, doc, oid::ObjectId};

fn sample_books(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            doc! {
                "_id": ObjectId::new(),
                "__v": 0,
                "authors": format!("Author {}", i),
                "bookID": format!("B{}", i),
                "bookName": format!("Book number {}", i),
                "category": "Fiction",
                "edition": "1st",
                "ISBN": format!("978-0-{:06}", i),
                "year": "2020",
            }
        })
        .collect()
}

/// Benchmark transforming a full document.
fn bench_transform_full(c: &mut Criterion) {
    let books = sample_books(1000);

    c.bench_function("transform_book_full_x1000", |b| {
        b.iter(|| {
            for book in &books {
                black_box(transform_book(book));
            }
        })
    });
}

/// Benchmark transforming documents that need every default.
fn bench_transform_sparse(c: &mut Criterion) {
    let books: Vec<Document> = (0..1000).map(|i| doc! { "_id": i as i64 }).collect();

    c.bench_function("transform_book_sparse_x1000", |b| {
        b.iter(|| {
            for book in &books {
                black_box(transform_book(book));
            }
        })
    });
}

criterion_group!(benches, bench_transform_full, bench_transform_sparse);
criterion_main!(benches);
