//! Streaming text transducers that sit between the UTF-8 decoder and the
//! tokenizer's state machine. Each exposes `decode(code_point) -> Vec<i32>`:
//! feed one code unit, get back zero or more code points. They compose by
//! nested iteration in [`crate::tokenizer::Tokenizer::process`].

use crate::text::{hex_char_to_value, is_hex_digit, EOF};

/// Replaces `??X` trigraphs with their single-character equivalents.
/// Bypassed while the tokenizer is in raw-string mode.
#[derive(Default)]
pub struct TrigraphDecoder {
    state: u8,
}

fn trigraph_replacement(c: i32) -> Option<i32> {
    Some(match c {
        x if x == '=' as i32 => '#' as i32,
        x if x == '/' as i32 => '\\' as i32,
        x if x == '\'' as i32 => '^' as i32,
        x if x == '(' as i32 => '[' as i32,
        x if x == ')' as i32 => ']' as i32,
        x if x == '!' as i32 => '|' as i32,
        x if x == '<' as i32 => '{' as i32,
        x if x == '>' as i32 => '}' as i32,
        x if x == '-' as i32 => '~' as i32,
        _ => return None,
    })
}

impl TrigraphDecoder {
    pub fn decode(&mut self, input: i32) -> Vec<i32> {
        match self.state {
            0 => {
                if input == '?' as i32 {
                    self.state = 1;
                    vec![]
                } else {
                    vec![input]
                }
            }
            1 => {
                if input == '?' as i32 {
                    self.state = 2;
                    vec![]
                } else {
                    self.state = 0;
                    vec!['?' as i32, input]
                }
            }
            2 => {
                if input == '?' as i32 {
                    vec!['?' as i32]
                } else {
                    self.state = 0;
                    match trigraph_replacement(input) {
                        Some(r) => vec![r],
                        None => vec!['?' as i32, '?' as i32, input],
                    }
                }
            }
            _ => unreachable!(),
        }
    }
}

/// Recognises `\uXXXX` and `\UXXXXXXXX` universal character names and
/// collapses them to the single code point they denote.
#[derive(Default)]
pub struct UniversalCharacterNameDecoder {
    state: u8,
    digits_remaining: u8,
    code_point: u32,
    acc: Vec<i32>,
}

impl UniversalCharacterNameDecoder {
    pub fn decode(&mut self, input: i32) -> Vec<i32> {
        match self.state {
            0 => {
                if input == '\\' as i32 {
                    self.acc = vec![input];
                    self.state = 1;
                    vec![]
                } else {
                    vec![input]
                }
            }
            1 => {
                self.acc.push(input);
                if input == 'u' as i32 {
                    self.digits_remaining = 4;
                    self.state = 2;
                    self.code_point = 0;
                    vec![]
                } else if input == 'U' as i32 {
                    self.digits_remaining = 8;
                    self.state = 2;
                    self.code_point = 0;
                    vec![]
                } else if input == '\\' as i32 {
                    self.state = 1;
                    self.acc = vec!['\\' as i32];
                    vec!['\\' as i32]
                } else {
                    self.state = 0;
                    vec!['\\' as i32, input]
                }
            }
            2 => {
                self.acc.push(input);
                if !is_hex_digit(input) {
                    self.state = 0;
                    std::mem::take(&mut self.acc)
                } else {
                    self.code_point = (self.code_point << 4) + hex_char_to_value(input);
                    self.digits_remaining -= 1;
                    if self.digits_remaining == 0 {
                        self.state = 0;
                        vec![self.code_point as i32]
                    } else {
                        vec![]
                    }
                }
            }
            _ => unreachable!(),
        }
    }
}

/// Deletes a backslash immediately followed by a newline (`\\\n` or
/// `\\\r\n`), joining the spliced physical lines into one logical line.
#[derive(Default)]
pub struct LineSplicer {
    state: u8,
}

impl LineSplicer {
    pub fn decode(&mut self, input: i32) -> Vec<i32> {
        match self.state {
            0 => {
                if input == '\\' as i32 {
                    self.state = 1;
                    vec![]
                } else {
                    vec![input]
                }
            }
            1 => {
                if input == '\n' as i32 {
                    self.state = 0;
                    vec![]
                } else if input == '\r' as i32 {
                    self.state = 2;
                    vec![]
                } else if input == '\\' as i32 {
                    vec!['\\' as i32]
                } else {
                    self.state = 0;
                    vec!['\\' as i32, input]
                }
            }
            2 => {
                if input == '\n' as i32 {
                    self.state = 0;
                    vec![]
                } else {
                    self.state = 0;
                    vec!['\\' as i32, '\r' as i32, input]
                }
            }
            _ => unreachable!(),
        }
    }
}

/// Guarantees the stream ends with exactly one `\n` before the EOF
/// sentinel, even if the source file had no trailing newline.
#[derive(Default)]
pub struct NewlineEnder {
    state: u8,
}

impl NewlineEnder {
    pub fn decode(&mut self, input: i32) -> Vec<i32> {
        match self.state {
            0 => {
                if input == EOF {
                    vec![EOF]
                } else if input == '\n' as i32 {
                    self.state = 2;
                    vec![input]
                } else {
                    self.state = 1;
                    vec![input]
                }
            }
            1 => {
                if input == '\n' as i32 {
                    self.state = 2;
                    vec![input]
                } else if input == EOF {
                    vec!['\n' as i32, EOF]
                } else {
                    vec![input]
                }
            }
            2 => {
                if input == '\n' as i32 {
                    vec![input]
                } else if input == EOF {
                    vec![EOF]
                } else {
                    self.state = 1;
                    vec![input]
                }
            }
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<D: FnMut(i32) -> Vec<i32>>(mut decode: D, input: &[i32]) -> Vec<i32> {
        input.iter().flat_map(|&c| decode(c)).collect()
    }

    #[test]
    fn trigraph_replaces_known_sequences() {
        let mut d = TrigraphDecoder::default();
        let input: Vec<i32> = "??=".chars().map(|c| c as i32).collect();
        assert_eq!(run(|c| d.decode(c), &input), vec!['#' as i32]);
    }

    #[test]
    fn trigraph_passes_through_unknown_sequences() {
        let mut d = TrigraphDecoder::default();
        let input: Vec<i32> = "??x".chars().map(|c| c as i32).collect();
        assert_eq!(run(|c| d.decode(c), &input), vec!['?' as i32, '?' as i32, 'x' as i32]);
    }

    #[test]
    fn ucn_decodes_four_digit_form() {
        let mut d = UniversalCharacterNameDecoder::default();
        let input: Vec<i32> = "\\u00e9".chars().map(|c| c as i32).collect();
        assert_eq!(run(|c| d.decode(c), &input), vec![0x00e9]);
    }

    #[test]
    fn line_splicer_removes_backslash_newline() {
        let mut d = LineSplicer::default();
        let input: Vec<i32> = "a\\\nb".chars().map(|c| c as i32).collect();
        assert_eq!(run(|c| d.decode(c), &input), vec!['a' as i32, 'b' as i32]);
    }

    #[test]
    fn line_splicer_keeps_lone_backslash() {
        let mut d = LineSplicer::default();
        let input: Vec<i32> = "a\\b".chars().map(|c| c as i32).collect();
        assert_eq!(run(|c| d.decode(c), &input), vec!['a' as i32, '\\' as i32, 'b' as i32]);
    }

    #[test]
    fn newline_ender_appends_missing_final_newline() {
        let mut d = NewlineEnder::default();
        let input = vec!['a' as i32, EOF];
        assert_eq!(run(|c| d.decode(c), &input), vec!['a' as i32, '\n' as i32, EOF]);
    }

    #[test]
    fn newline_ender_leaves_existing_final_newline_alone() {
        let mut d = NewlineEnder::default();
        let input = vec!['a' as i32, '\n' as i32, EOF];
        assert_eq!(run(|c| d.decode(c), &input), vec!['a' as i32, '\n' as i32, EOF]);
    }
}
