//! Message types a signal can be published as.

use std::fmt;
use std::str::FromStr;

use dgm_types::{DgmError, TopicMessage};

/// Wire type of a transport topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicType {
    /// A single scalar; the signal must hold exactly one value.
    Double,
    /// A vector of any length.
    Vector,
    /// A 3D vector; the signal must hold exactly three values.
    Vector3,
}

impl TopicType {
    /// Convert a signal value into a message of this type.
    ///
    /// # Errors
    ///
    /// [`DgmError::Conversion`] when `values` does not have the arity the
    /// type requires.
    pub fn to_message(self, signal: &str, values: &[f64]) -> Result<TopicMessage, DgmError> {
        let mismatch = || DgmError::Conversion {
            signal: signal.to_string(),
            expected: self.to_string(),
            len: values.len(),
        };
        match self {
            TopicType::Double => match values {
                [v] => Ok(TopicMessage::Double(*v)),
                _ => Err(mismatch()),
            },
            TopicType::Vector => Ok(TopicMessage::Vector(values.to_vec())),
            TopicType::Vector3 => match values {
                [x, y, z] => Ok(TopicMessage::Vector3([*x, *y, *z])),
                _ => Err(mismatch()),
            },
        }
    }

    /// Accept an incoming message for a topic of this type, returning the
    /// signal values it carries.
    ///
    /// # Errors
    ///
    /// [`DgmError::Conversion`] when the message arity does not fit.
    pub fn from_message(self, signal: &str, message: &TopicMessage) -> Result<Vec<f64>, DgmError> {
        let values = message.to_values();
        self.to_message(signal, &values)?;
        Ok(values)
    }
}

impl fmt::Display for TopicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicType::Double => write!(f, "double"),
            TopicType::Vector => write!(f, "vector"),
            TopicType::Vector3 => write!(f, "vector3"),
        }
    }
}

impl FromStr for TopicType {
    type Err = DgmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "double" => Ok(TopicType::Double),
            "vector" => Ok(TopicType::Vector),
            "vector3" => Ok(TopicType::Vector3),
            other => Err(DgmError::UnknownTopicType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        assert_eq!("double".parse::<TopicType>(), Ok(TopicType::Double));
        assert_eq!("vector".parse::<TopicType>(), Ok(TopicType::Vector));
        assert_eq!("vector3".parse::<TopicType>(), Ok(TopicType::Vector3));
        assert_eq!(
            "matrixHomo".parse::<TopicType>(),
            Err(DgmError::UnknownTopicType("matrixHomo".to_string()))
        );
    }

    #[test]
    fn arity_is_enforced() {
        assert_eq!(
            TopicType::Double.to_message("s", &[2.5]),
            Ok(TopicMessage::Double(2.5))
        );
        assert!(TopicType::Double.to_message("s", &[1.0, 2.0]).is_err());
        assert!(TopicType::Vector3.to_message("s", &[1.0]).is_err());
        assert_eq!(
            TopicType::Vector.to_message("s", &[]),
            Ok(TopicMessage::Vector(vec![]))
        );
    }

    #[test]
    fn incoming_vector_fits_vector3_topic_when_length_matches() {
        let msg = TopicMessage::Vector(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            TopicType::Vector3.from_message("s", &msg),
            Ok(vec![1.0, 2.0, 3.0])
        );
        let short = TopicMessage::Vector(vec![1.0]);
        assert!(matches!(
            TopicType::Vector3.from_message("s", &short),
            Err(DgmError::Conversion { len: 1, .. })
        ));
    }
}
