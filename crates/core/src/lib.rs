#![forbid(unsafe_code)]

pub mod model;
pub mod policy;
pub mod risk;

pub mod ids {
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct NoticeId(String);

    impl NoticeId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            validate_id(&value, 64)?;
            Ok(Self(value))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ActorId(String);

    impl ActorId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            validate_id(&value, 64)?;
            Ok(Self(value))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdError {
        Empty,
        TooLong,
        InvalidFirstChar,
        InvalidChar { ch: char, index: usize },
    }

    impl std::fmt::Display for IdError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Empty => write!(f, "id must not be empty"),
                Self::TooLong => write!(f, "id exceeds the maximum length"),
                Self::InvalidFirstChar => write!(f, "id must start with an alphanumeric"),
                Self::InvalidChar { ch, index } => {
                    write!(f, "id contains invalid char {ch:?} at index {index}")
                }
            }
        }
    }

    impl std::error::Error for IdError {}

    fn validate_id(value: &str, max_len: usize) -> Result<(), IdError> {
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        if value.len() > max_len {
            return Err(IdError::TooLong);
        }
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(IdError::Empty);
        };
        if !first.is_ascii_alphanumeric() {
            return Err(IdError::InvalidFirstChar);
        }
        for (index, ch) in value.chars().enumerate() {
            if index == 0 {
                continue;
            }
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '@' | '-') {
                continue;
            }
            return Err(IdError::InvalidChar { ch, index });
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn accepts_typical_notice_ids() {
            assert!(NoticeId::try_new("CA-2024-001").is_ok());
            assert!(NoticeId::try_new("n1").is_ok());
        }

        #[test]
        fn rejects_empty_and_bad_first_char() {
            assert_eq!(NoticeId::try_new(""), Err(IdError::Empty));
            assert_eq!(NoticeId::try_new("-x"), Err(IdError::InvalidFirstChar));
        }

        #[test]
        fn rejects_invalid_chars_with_position() {
            assert_eq!(
                ActorId::try_new("al ice"),
                Err(IdError::InvalidChar { ch: ' ', index: 2 })
            );
        }

        #[test]
        fn rejects_over_length_ids() {
            let long = "a".repeat(65);
            assert_eq!(NoticeId::try_new(long), Err(IdError::TooLong));
        }
    }
}
