/// Point in a file up to which everything has been consumed.
///
/// `offset` is the byte offset at which `last_line` starts. Default value means that nothing was
/// read yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub offset: u64,
    /// Raw content of the last consumed line, possibly including its `\n`
    pub last_line: Vec<u8>,
}

impl Position {
    /// Position of a file that was not read yet.
    pub const START: Position = Position {
        offset: 0,
        last_line: Vec::new(),
    };

    pub fn new(offset: u64, last_line: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            last_line: last_line.into(),
        }
    }

    /// Whether nothing was consumed at this position.
    pub fn is_start(&self) -> bool {
        self.offset == 0 && self.last_line.is_empty()
    }

    /// Compare `line` to `last_line`, ignoring a trailing line terminator on either side.
    pub fn line_matches(&self, line: &[u8]) -> bool {
        strip_terminator(&self.last_line) == strip_terminator(line)
    }
}

pub(crate) fn strip_terminator(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{strip_terminator, Position};

    #[test]
    fn default_is_start() {
        assert_eq!(Position::default(), Position::START);
        assert!(Position::START.is_start());
        assert!(!Position::new(0, "a").is_start());
        assert!(!Position::new(3, "").is_start());
    }

    #[rstest]
    #[case(b"abc\n", b"abc\n", true)]
    #[case(b"abc", b"abc\n", true)]
    #[case(b"abc\n", b"abc", true)]
    #[case(b"abc\n", b"abd\n", false)]
    #[case(b"", b"\n", true)]
    #[case(b"abc\n\n", b"abc\n", false)]
    fn line_matching_ignores_terminator(
        #[case] last_line: &'static [u8],
        #[case] line: &'static [u8],
        #[case] expected: bool,
    ) {
        assert_eq!(Position::new(0, last_line).line_matches(line), expected);
    }

    #[test]
    fn only_one_terminator_is_stripped() {
        assert_eq!(strip_terminator(b"a\n\n"), b"a\n");
        assert_eq!(strip_terminator(b"a\r\n"), b"a\r");
    }
}
