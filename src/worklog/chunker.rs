use crate::worklog::extract::{Role, Turn};
use crate::worklog::util::take_chars;

pub const TRUNCATION_SUFFIX: &str = "...[truncated]";

/// Greedy split of `turns` into chunks of at most `budget` characters.
///
/// A turn longer than the budget is cut to `budget` characters plus
/// [`TRUNCATION_SUFFIX`] and ends up alone in its chunk. Boundaries only
/// fall between turns and turn order is preserved.
pub fn chunk(turns: Vec<Turn>, budget: usize) -> Vec<Vec<Turn>> {
    let budget = budget.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<Turn> = Vec::new();
    let mut current_size = 0usize;

    for mut turn in turns {
        let mut size = turn.char_len();
        if size > budget {
            let mut cut = take_chars(&turn.text, budget);
            cut.push_str(TRUNCATION_SUFFIX);
            turn.text = cut;
            size = budget;
        }

        if current_size + size > budget && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(turn);
        current_size += size;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn role_marker(role: Role) -> &'static str {
    match role {
        Role::User => "USER",
        Role::Assistant => "CLAUDE",
    }
}

/// Transcript text sent to the classifier, one role-prefixed block per turn.
pub fn format_chunk(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}\n", role_marker(t.role), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}
