use crate::InferError;

pub const EXPECTED_COMPLETIONS: usize = 3;
const COMPLETION_SEPARATOR: &str = "---";
const STRIP_CHARS: &[char] = &[' ', '\n', '\t', '`'];

/// Splits raw model output into candidate lines. The model must answer with
/// exactly three parts; blank parts are dropped afterwards.
pub fn parse_completion_output(output: &str) -> Result<Vec<String>, InferError> {
    let parts = output.split(COMPLETION_SEPARATOR).collect::<Vec<_>>();
    if parts.len() != EXPECTED_COMPLETIONS {
        return Err(InferError::InvalidOutput(format!(
            "expected exactly {EXPECTED_COMPLETIONS} completions separated by '{COMPLETION_SEPARATOR}', found {}",
            parts.len()
        )));
    }

    Ok(parts
        .into_iter()
        .map(|part| part.trim_matches(STRIP_CHARS))
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_candidates() {
        let output = "if is_express:\n---\nreturn total_cost\n---\n`print(total_cost)`\n";
        assert_eq!(
            parse_completion_output(output).expect("parse"),
            vec!["if is_express:", "return total_cost", "print(total_cost)"]
        );
    }

    #[test]
    fn drops_blank_parts_after_counting() {
        let output = "for x in xs:\n---\n \n---\nwhile True:";
        assert_eq!(
            parse_completion_output(output).expect("parse"),
            vec!["for x in xs:", "while True:"]
        );
    }

    #[test]
    fn rejects_wrong_part_count() {
        let err = parse_completion_output("only one line").expect_err("one part");
        assert!(matches!(err, InferError::InvalidOutput(_)));
        assert!(parse_completion_output("a\n---\nb\n---\nc\n---\nd").is_err());
    }
}
