//! Reassembly of streamed text deltas into printable units.
//!
//! Endpoints chunk their responses at arbitrary token boundaries, so a
//! sentence usually arrives split across several frames and a technical term
//! occasionally arrives split mid-word. The [`Reassembler`] buffers incoming
//! fragments and emits completed units — sentences or list items — as soon as
//! they close, applying a fixed sequence of cleanup rules to each one.
//!
//! Cleanup rules, in application order:
//!
//! 1. strip markdown emphasis markers (per fragment, before buffering);
//! 2. collapse runs of spaces;
//! 3. tighten whitespace before punctuation;
//! 4. repair known split technical terms from [`SPLIT_TERM_REPAIRS`].
//!
//! Rules 2–4 run at unit-finalization time so that repairs spanning frame
//! boundaries still apply. The reassembler is single-pass and not
//! restartable; one instance serves exactly one query.

/// Known tokenization artifacts where a technical term arrives split across
/// frames. Applied to every finalized unit.
pub const SPLIT_TERM_REPAIRS: &[(&str, &str)] = &[
    ("Sol ana", "Solana"),
    ("Bit coin", "Bitcoin"),
    ("Ether eum", "Ethereum"),
    ("Poly gon", "Polygon"),
    ("block chain", "blockchain"),
    ("test net", "testnet"),
];

/// Per-query stream buffer: pending text, emitted units, and list mode.
pub struct Reassembler {
    pending: String,
    units: Vec<String>,
    in_list: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            units: Vec::new(),
            in_list: false,
        }
    }

    /// Units emitted so far.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Feed one text delta into the buffer.
    ///
    /// A fragment flushes the buffer into a completed unit when the buffer
    /// ends in terminal punctuation, or when the fragment is recognized as a
    /// list-item marker (a leading ordinal like `1.` or a bullet), in which
    /// case any pending non-list buffer is flushed first and list mode is
    /// entered. While in list mode, fragments lacking a new marker are
    /// space-joined onto the current item; a newline boundary closes it.
    pub fn push_fragment(&mut self, raw: &str) {
        let fragment = strip_emphasis(raw).replace('\r', "");

        if !fragment.contains('\n') {
            self.append(&fragment, false);
            return;
        }

        for (i, part) in fragment.split('\n').enumerate() {
            if i > 0 && self.in_list {
                self.flush_pending();
            }
            if i == 0 {
                // Continuation of whatever is already buffered.
                self.append(part, false);
            } else if !part.trim().is_empty() {
                self.append(part.trim(), true);
            }
        }
    }

    /// Flush any pending text and return all emitted units.
    pub fn finish(mut self) -> Vec<String> {
        self.flush_pending();
        self.units
    }

    fn append(&mut self, text: &str, joined: bool) {
        if text.is_empty() {
            return;
        }

        if is_list_marker(text.trim_start()) {
            self.flush_pending();
            self.pending.push_str(text.trim());
            self.in_list = true;
        } else {
            if !self.pending.is_empty()
                && (self.in_list || joined)
                && !self.pending.ends_with(' ')
                && !text.starts_with(' ')
            {
                self.pending.push(' ');
            }
            self.pending.push_str(if joined { text.trim() } else { text });
        }

        if self.pending.trim_end().ends_with(['.', '!', '?']) {
            self.flush_pending();
        }
    }

    fn flush_pending(&mut self) {
        let unit = finalize_unit(&self.pending);
        self.pending.clear();
        self.in_list = false;
        if !unit.is_empty() {
            self.units.push(unit);
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Cleanup rules ──────────────────────────────────────────────────

/// Rule 1: remove stray markdown emphasis markers.
pub fn strip_emphasis(s: &str) -> String {
    s.replace("**", "").replace("__", "")
}

/// Rule 2: collapse runs of spaces into one.
pub fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch == ' ' {
            if !prev_space {
                out.push(ch);
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out
}

/// Rule 3: drop whitespace immediately before punctuation.
pub fn tighten_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '.' | ',' | '!' | '?' | ':' | ';') && out.ends_with(' ') {
            out.pop();
        }
        out.push(ch);
    }
    out
}

/// Rule 4: repair split technical terms.
pub fn repair_split_terms(s: &str) -> String {
    let mut text = s.to_string();
    for (from, to) in SPLIT_TERM_REPAIRS {
        text = text.replace(from, to);
    }
    text
}

fn finalize_unit(raw: &str) -> String {
    let collapsed = collapse_spaces(raw.trim());
    let tightened = tighten_punctuation(&collapsed);
    repair_split_terms(&tightened)
}

/// Whether a fragment opens a list item: a leading ordinal (`1.`, `12.`) or
/// a bullet character followed by a space.
fn is_list_marker(s: &str) -> bool {
    if s.starts_with("• ") || s.starts_with("- ") {
        return true;
    }
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && s.chars().nth(digits) == Some('.')
}
