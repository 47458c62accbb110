//! Reading the to-do list aloud.

use nightstand_speaks::{SpeechError, SpeechManager};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A to-do entry as far as reading it aloud is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: u64,
    pub text: String,
    pub is_completed: bool,
    pub sort_order: i64,
}

/// Builds the spoken summary of `items`, in `sort_order`.
///
/// ## Examples
///
/// ```
/// use nightstand_lib::{TodoItem, read_aloud_script};
///
/// let items = vec![
///     TodoItem { id: 1, text: "Buy milk".into(), is_completed: false, sort_order: 0 },
///     TodoItem { id: 2, text: "Charge phone".into(), is_completed: true, sort_order: 1 },
/// ];
/// assert_eq!(
///     read_aloud_script(&items),
///     "You have 2 to-do items. 1. Buy milk. 2. Completed: Charge phone."
/// );
/// ```
pub fn read_aloud_script(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "Your to-do list is empty.".to_string();
    }

    let mut ordered: Vec<&TodoItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.sort_order);

    let mut script = format!("You have {} to-do items.", ordered.len());
    for (index, item) in ordered.iter().enumerate() {
        script.push_str(&format!(" {}. ", index + 1));
        if item.is_completed {
            script.push_str("Completed: ");
        }
        script.push_str(item.text.trim());
        script.push('.');
    }
    script
}

/// Speaks the to-do list. An empty list is not read; returns whether
/// anything was spoken.
///
/// ## Errors
///
/// Returns the speech manager's error.
pub async fn read_aloud(manager: &SpeechManager, items: &[TodoItem]) -> Result<bool, SpeechError> {
    if items.is_empty() {
        return Ok(false);
    }

    info!(count = items.len(), "reading to-do list aloud");
    manager.speak(&read_aloud_script(items)).await?;
    Ok(true)
}
