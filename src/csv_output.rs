//! CSV output for ranked results

/// One ranked line
#[derive(Debug, Clone)]
pub struct RankRow {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub novelty: f64,
    pub score: f64,
    pub token_info: f64,
    pub template_info: f64,
    pub template: String,
    pub line: String,
}

/// Collects rows and renders RFC-4180-style CSV
#[derive(Debug, Default)]
pub struct RankCsv {
    rows: Vec<RankRow>,
}

impl RankCsv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, row: RankRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the full document, header first
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "timestamp,level,novelty,score,token_info,template_info,template,line\n",
        );
        for row in &self.rows {
            out.push_str(&format!(
                "{},{},{:.6},{:.6},{:.6},{:.6},{},{}\n",
                escape_field(row.timestamp.as_deref().unwrap_or("")),
                escape_field(row.level.as_deref().unwrap_or("")),
                row.novelty,
                row.score,
                row.token_info,
                row.template_info,
                escape_field(&row.template),
                escape_field(&row.line),
            ));
        }
        out
    }
}

/// Wrap in quotes and double embedded quotes when the field needs it
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
