//! Agent Prompts - generation and repair prompts for the SQL author
//!
//! Both prompts list the same candidate tables so a repair attempt narrows the
//! generator's choices instead of starting over.

use crate::schema_rag::CandidateSet;

const REPAIR_REQUEST: &str = "Fix the SQL to comply with allowed tables/columns.";

#[derive(Debug, Clone, Copy)]
pub struct PromptComposer {
    max_rows: u64,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self { max_rows: 1000 }
    }
}

impl PromptComposer {
    pub fn new(max_rows: u64) -> Self {
        Self { max_rows }
    }

    /// Initial prompt for a user request.
    pub fn build(&self, user_query: &str, candidates: &CandidateSet) -> String {
        let mut parts = Vec::new();

        parts.push("System:".to_string());
        parts.push("You are an expert ClickHouse SQL generator.".to_string());
        parts.push(
            "Use ONLY the tables and columns listed below. Do NOT invent tables or columns."
                .to_string(),
        );
        parts.push(
            "Return EXACTLY one SQL SELECT statement enclosed in triple backticks and nothing else."
                .to_string(),
        );
        parts.push(format!(
            "Use ClickHouse SQL dialect. Always include an ORDER BY when appropriate and a LIMIT (max {}).",
            self.max_rows
        ));

        parts.push("\nAvailable tables:".to_string());
        for table in candidates.tables() {
            parts.push(format!("- {}: [{}]", table.fq_name(), table.columns().join(", ")));
        }

        parts.push(format!("\nUser request:\n\"{}\"", user_query));
        parts.push(
            "\nImportant: the SQL must be read-only, and must reference only the provided tables/columns."
                .to_string(),
        );
        parts.push("Output:\n```sql\n<your single SELECT statement here>\n```".to_string());

        let mut prompt = parts.join("\n");
        prompt.push('\n');
        prompt
    }

    /// Prompt for the next attempt after `previous_sql` failed with `reason`.
    pub fn build_repair(&self, previous_sql: &str, reason: &str, candidates: &CandidateSet) -> String {
        let mut prompt = self.build(REPAIR_REQUEST, candidates);
        prompt.push_str(&format!("\nPrevious SQL had error: {}\n", reason));
        prompt.push_str(&format!("Previous SQL:\n```\n{}\n```\n", previous_sql));
        prompt.push_str("Respond with corrected SQL ONLY inside triple backticks.\n");
        prompt
    }
}
