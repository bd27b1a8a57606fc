//! Balanced `<thought>…</thought>` interleaving for the reasoning/complex
//! ramp stages' side-channel chain-of-thought tokens.

/// Wraps chunks drained from a thought side-channel so that every opening
/// marker is matched by a closing one before the caller moves on to a
/// subsequent non-thought token — property 11 of the testable properties.
///
/// Call [`open`](Self::open) before forwarding a thought chunk and
/// [`close_if_open`](Self::close_if_open) before forwarding any non-thought
/// token (including at end of stream); both are idempotent no-ops when
/// already in the matching state.
#[derive(Debug, Default)]
pub struct ThoughtWriter {
    open: bool,
}

impl ThoughtWriter {
    /// Build a writer starting outside a thought span.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an opening marker if one isn't already open, then the chunk.
    pub fn open(&mut self, chunk: &str, out: &mut String) {
        if !self.open {
            out.push_str("<thought>");
            self.open = true;
        }
        out.push_str(chunk);
    }

    /// Emit a closing marker if a thought span is open.
    pub fn close_if_open(&mut self, out: &mut String) {
        if self.open {
            out.push_str("</thought>");
            self.open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balances_a_single_span() {
        let mut w = ThoughtWriter::new();
        let mut out = String::new();
        w.open("reasoning step one", &mut out);
        w.close_if_open(&mut out);
        out.push_str("main stream token");
        assert_eq!(out, "<thought>reasoning step one</thought>main stream token");
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let mut w = ThoughtWriter::new();
        let mut out = String::new();
        w.open("x", &mut out);
        w.close_if_open(&mut out);
        w.close_if_open(&mut out);
        assert_eq!(out, "<thought>x</thought>");
    }

    #[test]
    fn never_emits_unbalanced_markers() {
        let mut w = ThoughtWriter::new();
        let mut out = String::new();
        w.open("a", &mut out);
        w.open("b", &mut out);
        w.close_if_open(&mut out);
        assert_eq!(out.matches("<thought>").count(), out.matches("</thought>").count());
    }
}
