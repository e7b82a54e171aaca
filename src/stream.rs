//! Stream protocol: the metacharacter grammar consumed by the line driver
//! (`%` commands, `{…}` comments, `[…]` combinations). Kept in the library
//! because its behaviour is independently testable; the binary drives it
//! against a live `Engine` and formats `<ACK>`/`<NAK>` reporting. No direct
//! teacher analogue (the teacher has no line-protocol driver); grounded in
//! the parsing style of the teacher's own tokenizing code in
//! `keyer/vband.rs` (explicit character-class matching, no parser-
//! combinator crate), extended with the nesting rules this grammar needs.

/// One parsed unit of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// A character to key as CW. `suppress_trailing_gap` is set for every
    /// character but the last inside a `[...]` combination.
    Send { c: char, suppress_trailing_gap: bool },
    /// Comment text: echoed to stdout, never keyed.
    Echo(char),
    SetParameter { letter: char, value: i64 },
    Query { letter: char },
    SpokenQuery { letter: char },
    Quit,
}

/// Runtime-toggleable honouring of the three bracket/command forms,
/// mutated by `%C`/`%O`/`%P` as the stream is parsed.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub do_comments: bool,
    pub do_combinations: bool,
    pub do_commands: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions { do_comments: true, do_combinations: true, do_commands: true }
    }
}

pub struct StreamParser {
    pub options: StreamOptions,
}

impl Default for StreamParser {
    fn default() -> Self {
        StreamParser { options: StreamOptions::default() }
    }
}

impl StreamParser {
    pub fn new(options: StreamOptions) -> Self {
        StreamParser { options }
    }

    /// Parses one chunk of input into events. Comments may nest inside
    /// combinations (bracket content can contain braces); combinations may
    /// not nest inside comments (bracket characters inside a comment are
    /// just echoed text).
    pub fn parse(&mut self, input: &str) -> Vec<StreamEvent> {
        let chars: Vec<char> = input.chars().collect();
        let mut events = Vec::new();
        let mut i = 0;
        let mut comment_depth: u32 = 0;
        let mut combination_active = false;
        let mut combination_buffer: Vec<char> = Vec::new();

        while i < chars.len() {
            let c = chars[i];

            if comment_depth > 0 {
                match c {
                    '{' if self.options.do_comments => comment_depth += 1,
                    '}' if self.options.do_comments => comment_depth -= 1,
                    _ => events.push(StreamEvent::Echo(c)),
                }
                i += 1;
                continue;
            }

            match c {
                '{' if self.options.do_comments => {
                    comment_depth = 1;
                    i += 1;
                }
                '[' if self.options.do_combinations && !combination_active => {
                    combination_active = true;
                    combination_buffer.clear();
                    i += 1;
                }
                ']' if self.options.do_combinations && combination_active => {
                    flush_combination(&mut events, &combination_buffer);
                    combination_active = false;
                    i += 1;
                }
                '%' if self.options.do_commands => {
                    let (event, consumed) = parse_command(&chars[i..]);
                    if let StreamEvent::SetParameter { letter: 'C', value } = event {
                        self.options.do_commands = value != 0;
                    }
                    if let StreamEvent::SetParameter { letter: 'O', value } = event {
                        self.options.do_combinations = value != 0;
                    }
                    if let StreamEvent::SetParameter { letter: 'P', value } = event {
                        self.options.do_comments = value != 0;
                    }
                    events.push(event);
                    i += consumed.max(1);
                }
                _ => {
                    if combination_active {
                        combination_buffer.push(c);
                    } else {
                        events.push(StreamEvent::Send { c, suppress_trailing_gap: false });
                    }
                    i += 1;
                }
            }
        }

        // Unterminated combination at end of input: flush what we have.
        if combination_active {
            flush_combination(&mut events, &combination_buffer);
        }

        events
    }
}

fn flush_combination(events: &mut Vec<StreamEvent>, buffer: &[char]) {
    let last = buffer.len().saturating_sub(1);
    for (i, &c) in buffer.iter().enumerate() {
        events.push(StreamEvent::Send { c, suppress_trailing_gap: i != last });
    }
}

/// Parses one `%`-command starting at `chars[0] == '%'`. Returns the event
/// and how many characters were consumed.
fn parse_command(chars: &[char]) -> (StreamEvent, usize) {
    if chars.len() < 2 {
        return (StreamEvent::Send { c: '%', suppress_trailing_gap: false }, 1);
    }
    match chars[1] {
        '?' => {
            let letter = chars.get(2).copied().unwrap_or('?');
            (StreamEvent::Query { letter }, 3)
        }
        '<' => {
            let letter = chars.get(2).copied().unwrap_or('<');
            (StreamEvent::SpokenQuery { letter }, 3)
        }
        'Q' | 'q' => {
            let consumed = if chars.get(2) == Some(&';') { 3 } else { 2 };
            (StreamEvent::Quit, consumed)
        }
        letter => {
            let mut j = 2;
            let mut digits = String::new();
            while j < chars.len() && chars[j].is_ascii_digit() {
                digits.push(chars[j]);
                j += 1;
            }
            if chars.get(j) == Some(&';') {
                j += 1;
            }
            let value = digits.parse::<i64>().unwrap_or(0);
            (StreamEvent::SetParameter { letter, value }, j)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_sends_every_character() {
        let mut p = StreamParser::default();
        let events = p.parse("CQ");
        assert_eq!(
            events,
            vec![
                StreamEvent::Send { c: 'C', suppress_trailing_gap: false },
                StreamEvent::Send { c: 'Q', suppress_trailing_gap: false },
            ]
        );
    }

    #[test]
    fn comment_is_echoed_not_sent() {
        let mut p = StreamParser::default();
        let events = p.parse("{hi}A");
        assert_eq!(
            events,
            vec![
                StreamEvent::Echo('h'),
                StreamEvent::Echo('i'),
                StreamEvent::Send { c: 'A', suppress_trailing_gap: false },
            ]
        );
    }

    #[test]
    fn combination_suppresses_gaps_except_last() {
        let mut p = StreamParser::default();
        let events = p.parse("[AR]");
        assert_eq!(
            events,
            vec![
                StreamEvent::Send { c: 'A', suppress_trailing_gap: true },
                StreamEvent::Send { c: 'R', suppress_trailing_gap: false },
            ]
        );
    }

    #[test]
    fn comment_nests_inside_combination() {
        let mut p = StreamParser::default();
        let events = p.parse("[A{x}R]");
        assert_eq!(
            events,
            vec![
                StreamEvent::Send { c: 'A', suppress_trailing_gap: true },
                StreamEvent::Echo('x'),
                StreamEvent::Send { c: 'R', suppress_trailing_gap: false },
            ]
        );
    }

    #[test]
    fn combination_bracket_inside_comment_is_just_text() {
        let mut p = StreamParser::default();
        let events = p.parse("{[}A");
        assert_eq!(
            events,
            vec![StreamEvent::Echo('['), StreamEvent::Send { c: 'A', suppress_trailing_gap: false }]
        );
    }

    #[test]
    fn set_parameter_command_parses_letter_and_value() {
        let mut p = StreamParser::default();
        let events = p.parse("%S20;A");
        assert_eq!(
            events,
            vec![
                StreamEvent::SetParameter { letter: 'S', value: 20 },
                StreamEvent::Send { c: 'A', suppress_trailing_gap: false },
            ]
        );
    }

    #[test]
    fn query_and_spoken_query_commands() {
        let mut p = StreamParser::default();
        assert_eq!(p.parse("%?S"), vec![StreamEvent::Query { letter: 'S' }]);
        assert_eq!(p.parse("%<S"), vec![StreamEvent::SpokenQuery { letter: 'S' }]);
    }

    #[test]
    fn quit_command() {
        let mut p = StreamParser::default();
        assert_eq!(p.parse("%Q;"), vec![StreamEvent::Quit]);
    }

    #[test]
    fn disabling_commands_at_runtime_stops_further_parsing_as_commands() {
        let mut p = StreamParser::default();
        let events = p.parse("%C0;%S20;");
        assert_eq!(events[0], StreamEvent::SetParameter { letter: 'C', value: 0 });
        // %S20; after commands are disabled is sent character-by-character.
        assert!(events[1..].iter().any(|e| matches!(e, StreamEvent::Send { c: '%', .. })));
    }
}
