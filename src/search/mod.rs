//! Tantivy-based search index over approved issues.
//!
//! Only approved issues are indexed; pending and rejected reports never leave
//! the admin views. Results carry issue ids, the caller loads full records.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{Issue, IssueStatus};

/// Field boosts: the issue title matters most, location least.
const BOOST_ISSUE_NAME: f32 = 10.0;
const BOOST_CATEGORY: f32 = 8.0;
const BOOST_DESCRIPTION: f32 = 6.0;
const BOOST_LOCATION: f32 = 4.0;

/// Deepest result a caller may page to (`offset + limit`).
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// Search result with issue id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub issue_id: String,
    pub score: f32,
}

/// One page of hits plus the number of matching issues in the index.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total: usize,
}

/// Search index schema fields.
struct SearchFields {
    issue_id: Field,
    issue_name: Field,
    category: Field,
    description: Field,
    location: Field,
}

/// Tantivy search index for approved issues.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let issue_id = schema_builder.add_text_field("issue_id", STRING | STORED);
        let issue_name = schema_builder.add_text_field("issue_name", TEXT | STORED);
        let category = schema_builder.add_text_field("category", TEXT);
        let description = schema_builder.add_text_field("description", TEXT);
        let location = schema_builder.add_text_field("location", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            issue_id,
            issue_name,
            category,
            description,
            location,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from the approved issues.
    pub async fn rebuild(&self, issues: &[Issue]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;

        let mut indexed = 0;
        for issue in issues.iter().filter(|i| i.status == IssueStatus::Approved) {
            writer.add_document(self.create_document(issue))?;
            indexed += 1;
        }

        writer.commit()?;
        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} issues", indexed);
        Ok(())
    }

    /// Index (or re-index) a single issue. Non-approved issues are removed instead.
    pub async fn index_issue(&self, issue: &Issue) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.issue_id, &issue.id);
        writer.delete_term(term);

        if issue.status == IssueStatus::Approved {
            writer.add_document(self.create_document(issue))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove an issue from the index.
    pub async fn remove_issue(&self, issue_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.issue_id, issue_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for issues matching the query.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, AppError> {
        if limit == 0 {
            return Err(AppError::Validation("limit must be at least 1".to_string()));
        }
        let window = limit
            .checked_add(offset)
            .filter(|window| *window <= MAX_RESULT_WINDOW)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "offset + limit must not exceed {}",
                    MAX_RESULT_WINDOW
                ))
            })?;

        if query_str.trim().is_empty() {
            return Ok(SearchPage::default());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.issue_name,
                self.fields.category,
                self.fields.description,
                self.fields.location,
            ],
        );

        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Validation(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();

        let field_queries = [
            (self.fields.issue_name, BOOST_ISSUE_NAME),
            (self.fields.category, BOOST_CATEGORY),
            (self.fields.description, BOOST_DESCRIPTION),
            (self.fields.location, BOOST_LOCATION),
        ];

        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                let boosted = BoostQuery::new(field_query, boost);
                subqueries.push((Occur::Should, Box::new(boosted)));
            }
        }

        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let (top_docs, total) = searcher
            .search(&combined_query, &(TopDocs::with_limit(window), Count))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results: Vec<SearchResult> = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let issue_id = doc.get_first(self.fields.issue_id)?.as_str()?.to_string();
                Some(SearchResult { issue_id, score })
            })
            .collect();

        Ok(SearchPage { results, total })
    }

    fn create_document(&self, issue: &Issue) -> TantivyDocument {
        let location = [
            &issue.address,
            &issue.upazila,
            &issue.district,
            &issue.division,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

        doc!(
            self.fields.issue_id => issue.id.clone(),
            self.fields.issue_name => issue.issue_name.clone(),
            self.fields.category => issue.category.clone(),
            self.fields.description => issue.description.clone(),
            self.fields.location => location
        )
    }
}
