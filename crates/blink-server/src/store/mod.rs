pub mod admin;
pub mod crypto;
pub mod db;
pub mod links;
pub mod model;
pub mod snippets;

#[cfg(test)]
mod tests;

pub use db::{Store, StoreOptions};
pub use links::CreatedLink;
pub use model::{
    CreatedSnippet, LinkRecord, LinkStats, SnippetRecord, SnippetSummary, SnippetView, StoreStats,
};
