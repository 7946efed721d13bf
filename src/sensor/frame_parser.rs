//! Parser for a single `w,x,y,z` line

use thiserror::Error;

use super::QuaternionSample;

const FIELD_DELIMITER: char = ',';
const REQUIRED_FIELDS: usize = 4;

/// Reasons a line is rejected
///
/// `Empty` is kept apart from the other variants because idle sensors emit
/// blank lines regularly and those must not show up as warnings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Empty line")]
    Empty,

    #[error("Incomplete frame, expected at least 4 fields but got {fields}: {line:?}")]
    Incomplete { fields: usize, line: String },

    #[error("Malformed field {index} ({field:?}) in frame {line:?}")]
    MalformedField {
        index: usize,
        field: String,
        line: String,
    },
}

/// Parses one line into a quaternion sample
///
/// Pure function: no logging, no shared state.
pub fn parse(line: &str) -> Result<QuaternionSample, ParseError> {
    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    if fields.len() < REQUIRED_FIELDS {
        return Err(ParseError::Incomplete {
            fields: fields.len(),
            line: line.to_string(),
        });
    }

    let mut values = [0.0f32; REQUIRED_FIELDS];
    for (index, field) in fields.iter().take(REQUIRED_FIELDS).enumerate() {
        values[index] = parse_field(field).ok_or_else(|| ParseError::MalformedField {
            index,
            field: field.to_string(),
            line: line.to_string(),
        })?;
    }

    let [w, x, y, z] = values;
    Ok(QuaternionSample { w, x, y, z })
}

fn parse_field(field: &str) -> Option<f32> {
    field
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_fields_in_wire_order() {
        let sample = parse("0.98,0.01,-0.17,0.02").unwrap();
        assert_eq!(sample, QuaternionSample::new(0.98, 0.01, -0.17, 0.02));
    }

    #[test]
    fn ignores_extra_fields() {
        let sample = parse("1,0,0,0,42,garbage").unwrap();
        assert_eq!(sample, QuaternionSample::IDENTITY);
    }

    #[test]
    fn trims_whitespace_around_fields() {
        let sample = parse(" 1.0 , 0.5,\t-0.5 ,0 ").unwrap();
        assert_eq!(sample, QuaternionSample::new(1.0, 0.5, -0.5, 0.0));
    }

    #[test]
    fn empty_and_blank_lines_are_empty() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn too_few_fields_is_incomplete() {
        assert_eq!(
            parse("1,0,0"),
            Err(ParseError::Incomplete {
                fields: 3,
                line: "1,0,0".to_string()
            })
        );
    }

    #[test]
    fn reports_offending_field() {
        match parse("1,0,abc,0") {
            Err(ParseError::MalformedField { index, field, line }) => {
                assert_eq!(index, 2);
                assert_eq!(field, "abc");
                assert_eq!(line, "1,0,abc,0");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_field_is_malformed() {
        assert!(matches!(
            parse("1,,0,0"),
            Err(ParseError::MalformedField { index: 1, .. })
        ));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        assert!(matches!(
            parse("NaN,0,0,0"),
            Err(ParseError::MalformedField { index: 0, .. })
        ));
        assert!(matches!(
            parse("1,inf,0,0"),
            Err(ParseError::MalformedField { index: 1, .. })
        ));
    }

    #[test]
    fn malformed_trailing_field_is_ignored() {
        assert!(parse("1,0,0,0,NaN").is_ok());
    }
}
