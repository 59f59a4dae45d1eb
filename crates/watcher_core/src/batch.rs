use crate::CodeHit;

/// Codes inserted as new during the current run, in insertion order.
///
/// Handed to every notification channel once, then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationBatch {
    entries: Vec<CodeHit>,
}

impl NotificationBatch {
    pub fn new(entries: Vec<CodeHit>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, hit: CodeHit) {
        self.entries.push(hit);
    }

    pub fn entries(&self) -> &[CodeHit] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subject(&self) -> String {
        let noun = if self.entries.len() == 1 { "code" } else { "codes" };
        format!("ShiftWatcher: {} new SHIFT {noun} found", self.entries.len())
    }

    /// Human-readable listing, one `code (source: url)` line per entry.
    pub fn listing(&self) -> String {
        let mut out = String::from("New SHIFT codes found:\n");
        for hit in &self.entries {
            out.push_str(&format!("{}  (source: {})\n", hit.code, hit.source));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::NotificationBatch;
    use crate::CodeHit;

    #[test]
    fn subject_states_count() {
        let mut batch = NotificationBatch::default();
        batch.push(CodeHit::new("ABCDE-FGHIJ", "https://a.example"));
        assert_eq!(batch.subject(), "ShiftWatcher: 1 new SHIFT code found");
        batch.push(CodeHit::new("KLMNO-PQRST", "https://b.example"));
        assert_eq!(batch.subject(), "ShiftWatcher: 2 new SHIFT codes found");
    }

    #[test]
    fn listing_has_one_line_per_code() {
        let batch = NotificationBatch::new(vec![
            CodeHit::new("ABCDE-FGHIJ", "https://a.example"),
            CodeHit::new("KLMNO-PQRST", "https://b.example"),
        ]);
        let listing = batch.listing();
        assert_eq!(listing.lines().count(), 3);
        assert!(listing.contains("ABCDE-FGHIJ  (source: https://a.example)"));
        assert!(listing.contains("KLMNO-PQRST  (source: https://b.example)"));
    }
}
