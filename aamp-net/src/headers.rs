/// Rebuilds `X-MoneyTrace` per request: trace-id and parent-id are fixed
/// for the lifetime of the downloader instance, span-id is regenerated
/// on every call (§4.2).
pub struct MoneyTrace {
    trace_id: String,
    parent_id: String,
}

impl MoneyTrace {
    pub fn new() -> Self {
        Self {
            trace_id: nanoid::nanoid!(16),
            parent_id: nanoid::nanoid!(16),
        }
    }

    pub fn next_span_header(&self) -> String {
        let span_id = nanoid::nanoid!(16);
        format!(
            "trace-id={};parent-id={};span-id={}",
            self.trace_id, self.parent_id, span_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_and_parent_ids_are_stable_across_spans() {
        let money_trace = MoneyTrace::new();
        let first = money_trace.next_span_header();
        let second = money_trace.next_span_header();
        assert_ne!(first, second);

        let prefix = format!("trace-id={};parent-id={}", money_trace.trace_id, money_trace.parent_id);
        assert!(first.starts_with(&prefix));
        assert!(second.starts_with(&prefix));
    }
}
