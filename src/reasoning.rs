//! Separates inline `<think>` reasoning from visible answer text.
//!
//! Some vendors stream chain-of-thought inside the ordinary content field,
//! wrapped in `<think>` / `</think>`. The split is a two-state machine driven
//! by [`split_chunk`], a pure function over `(state, carry, chunk)`.
//! [`ReasoningExtractor`] threads that state across the chunks of one stream.

pub const START_MARKER: &str = "<think>";
pub const END_MARKER: &str = "</think>";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThinkState {
    #[default]
    Normal,
    InsideThinking,
}

impl ThinkState {
    fn awaited_marker(self) -> &'static str {
        match self {
            Self::Normal => START_MARKER,
            Self::InsideThinking => END_MARKER,
        }
    }
}

/// Text carried from one chunk into the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Carry {
    /// Reasoning opened by a start marker in the previous chunk and not yet
    /// emitted. It leads the next call's reasoning output.
    pub tentative: String,
    /// Trailing text that may be the first bytes of the awaited marker.
    pub partial_marker: String,
}

impl Carry {
    pub fn is_empty(&self) -> bool {
        self.tentative.is_empty() && self.partial_marker.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub state: ThinkState,
    pub visible: String,
    pub reasoning: String,
    pub carry: Carry,
}

/// Classify one content chunk.
///
/// Markers are resolved left to right until none remain, so several complete
/// spans in a single chunk all count as reasoning.
pub fn split_chunk(state: ThinkState, carry: Carry, chunk: &str) -> Split {
    let Carry {
        tentative,
        partial_marker,
    } = carry;

    let mut input = partial_marker;
    input.push_str(chunk);

    let mut state = state;
    let mut visible = String::new();
    let mut reasoning = tentative;
    let mut next_tentative = String::new();
    let mut opened_here = false;
    let mut rest = input.as_str();

    loop {
        let marker = state.awaited_marker();
        if let Some(at) = rest.find(marker) {
            match state {
                ThinkState::Normal => visible.push_str(&rest[..at]),
                ThinkState::InsideThinking => reasoning.push_str(&rest[..at]),
            }
            rest = &rest[at + marker.len()..];
            opened_here = state == ThinkState::Normal;
            state = match state {
                ThinkState::Normal => ThinkState::InsideThinking,
                ThinkState::InsideThinking => ThinkState::Normal,
            };
            continue;
        }

        let keep = marker_prefix_len(rest, marker);
        let (settled, partial) = rest.split_at(rest.len() - keep);
        match state {
            ThinkState::Normal => visible.push_str(settled),
            ThinkState::InsideThinking if opened_here => next_tentative.push_str(settled),
            ThinkState::InsideThinking => reasoning.push_str(settled),
        }
        return Split {
            state,
            visible,
            reasoning,
            carry: Carry {
                tentative: next_tentative,
                partial_marker: partial.to_string(),
            },
        };
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`.
fn marker_prefix_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&n| text.ends_with(&marker[..n]))
        .unwrap_or(0)
}

/// Output of one extractor step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningDelta {
    pub visible: String,
    pub reasoning: String,
}

impl ReasoningDelta {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.reasoning.is_empty()
    }
}

/// Per-stream reasoning splitter.
#[derive(Debug, Default)]
pub struct ReasoningExtractor {
    state: ThinkState,
    carry: Carry,
}

impl ReasoningExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ThinkState {
        self.state
    }

    /// Split `content` and prepend any reasoning the vendor sent in a
    /// dedicated field. Dedicated reasoning is never scanned for markers.
    pub fn process(&mut self, content: &str, explicit_reasoning: Option<&str>) -> ReasoningDelta {
        let split = split_chunk(self.state, std::mem::take(&mut self.carry), content);
        self.state = split.state;
        self.carry = split.carry;

        let mut reasoning = explicit_reasoning.unwrap_or_default().to_string();
        reasoning.push_str(&split.reasoning);
        ReasoningDelta {
            visible: split.visible,
            reasoning,
        }
    }

    /// Release everything still held at end of stream.
    ///
    /// An unfinished marker prefix is classified by the current state; an
    /// unclosed span stays reasoning.
    pub fn finish(&mut self) -> ReasoningDelta {
        let Carry {
            tentative,
            partial_marker,
        } = std::mem::take(&mut self.carry);
        let state = std::mem::take(&mut self.state);

        let mut delta = ReasoningDelta {
            visible: String::new(),
            reasoning: tentative,
        };
        match state {
            ThinkState::Normal => delta.visible = partial_marker,
            ThinkState::InsideThinking => delta.reasoning.push_str(&partial_marker),
        }
        delta
    }
}
