//! Collection browsing helpers: item readiness survey and the collection tree.

use std::collections::{HashMap, HashSet};

use super::LibraryClient;
use super::types::{BibItem, Collection, LibraryError, find_ai_note, find_pdf_attachment};

/// Readiness of an item for summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyStatus {
    /// An AI note already exists.
    Done,
    /// No PDF attachment to summarize.
    NoPdf,
    /// Has a PDF and no AI note yet.
    Pending,
}

impl SurveyStatus {
    /// Short label for listings.
    pub fn label(self) -> &'static str {
        match self {
            Self::Done => "Done",
            Self::NoPdf => "No PDF",
            Self::Pending => "Pending",
        }
    }
}

/// An item together with what its children reveal about it.
#[derive(Debug, Clone)]
pub struct ItemOverview {
    /// The surveyed item.
    pub item: BibItem,
    /// At least one child attachment is a PDF.
    pub has_pdf: bool,
    /// At least one child note carries the AI marker tag.
    pub has_ai_note: bool,
}

impl ItemOverview {
    /// Existing AI notes win over a missing PDF.
    pub fn status(&self) -> SurveyStatus {
        if self.has_ai_note {
            SurveyStatus::Done
        } else if !self.has_pdf {
            SurveyStatus::NoPdf
        } else {
            SurveyStatus::Pending
        }
    }

    /// Only pending items may be queued for summarization.
    pub fn is_selectable(&self) -> bool {
        self.status() == SurveyStatus::Pending
    }
}

/// List the top-level items of a collection and inspect each item's children.
pub async fn survey_items(
    client: &dyn LibraryClient,
    collection_key: &str,
) -> Result<Vec<ItemOverview>, LibraryError> {
    let items = client.top_items(collection_key).await?;
    let mut overviews = Vec::with_capacity(items.len());
    for item in items {
        let children = client.children(&item.key).await?;
        overviews.push(ItemOverview {
            has_pdf: find_pdf_attachment(&children).is_some(),
            has_ai_note: find_ai_note(&children).is_some(),
            item,
        });
    }
    tracing::debug!(
        collection = collection_key,
        items = overviews.len(),
        "Surveyed collection items"
    );
    Ok(overviews)
}

/// A collection with its nested subcollections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNode {
    /// The collection at this node.
    pub collection: Collection,
    /// Direct subcollections in listing order.
    pub children: Vec<CollectionNode>,
}

/// Arrange a flat listing into a forest.
///
/// A collection whose parent is missing from the listing is placed at the root.
pub fn build_collection_tree(collections: Vec<Collection>) -> Vec<CollectionNode> {
    let known: HashSet<String> = collections.iter().map(|c| c.key.clone()).collect();
    let mut children_of: HashMap<String, Vec<Collection>> = HashMap::new();
    let mut roots = Vec::new();

    for collection in collections {
        match collection.parent.clone() {
            Some(parent) if known.contains(&parent) && parent != collection.key => {
                children_of.entry(parent).or_default().push(collection);
            }
            _ => roots.push(collection),
        }
    }

    let mut visited = HashSet::new();
    roots
        .into_iter()
        .map(|root| attach_children(root, &mut children_of, &mut visited))
        .collect()
}

fn attach_children(
    collection: Collection,
    children_of: &mut HashMap<String, Vec<Collection>>,
    visited: &mut HashSet<String>,
) -> CollectionNode {
    visited.insert(collection.key.clone());
    let children = children_of
        .remove(&collection.key)
        .unwrap_or_default()
        .into_iter()
        .filter(|child| !visited.contains(&child.key))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|child| attach_children(child, children_of, visited))
        .collect();
    CollectionNode {
        collection,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(key: &str, parent: Option<&str>) -> Collection {
        Collection {
            key: key.into(),
            name: format!("Name {key}"),
            parent: parent.map(Into::into),
            child_count: None,
        }
    }

    #[test]
    fn tree_nests_children_under_parents() {
        let tree = build_collection_tree(vec![
            collection("B", Some("A")),
            collection("A", None),
            collection("C", Some("B")),
            collection("D", None),
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].collection.key, "A");
        assert_eq!(tree[0].children[0].collection.key, "B");
        assert_eq!(tree[0].children[0].children[0].collection.key, "C");
        assert_eq!(tree[1].collection.key, "D");
    }

    #[test]
    fn orphaned_collections_become_roots() {
        let tree = build_collection_tree(vec![collection("X", Some("MISSING"))]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].collection.key, "X");
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn overview_status_prefers_existing_note() {
        let item = BibItem {
            key: "K".into(),
            title: Some("T".into()),
            item_type: "journalArticle".into(),
            creators: Vec::new(),
        };
        let overview = |has_pdf, has_ai_note| ItemOverview {
            item: item.clone(),
            has_pdf,
            has_ai_note,
        };
        assert_eq!(overview(false, true).status(), SurveyStatus::Done);
        assert_eq!(overview(false, false).status(), SurveyStatus::NoPdf);
        assert_eq!(overview(true, false).status(), SurveyStatus::Pending);
        assert!(overview(true, false).is_selectable());
        assert!(!overview(true, true).is_selectable());
        assert_eq!(SurveyStatus::NoPdf.label(), "No PDF");
    }
}
