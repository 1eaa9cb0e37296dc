//! Wire messages of the control protocol.
//!
//! The protocol is newline-delimited text. Outbound lines are commands;
//! inbound lines are replies and notifications. The first whitespace
//! token of an inbound line selects the message kind; anything else is
//! passed through uninterpreted.

use std::fmt;

/// One `name:value` pair from an INFO reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name as sent by the remote service.
    pub name: String,
    /// Raw value text.
    pub value: String,
}

impl Field {
    /// Creates a field pair.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Category of a correlated INFO query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryCategory {
    /// Previous-fix and listener metadata for a location listener.
    Location,
    /// Registered alarm metadata.
    Alarm,
    /// Current device time.
    Time,
}

impl QueryCategory {
    /// The wire token for this category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Alarm => "alarm",
            Self::Time => "time",
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Begin analysis of a package.
    Start {
        package: String,
    },
    /// Query live state; correlated with an inbound `INFO` reply.
    Info {
        category: QueryCategory,
        id: Option<String>,
    },
    /// Inject one concrete environment event.
    Trigger {
        category: String,
        id: Option<String>,
        payload: Option<String>,
    },
    /// Raw passthrough line for operator use.
    Execute {
        raw: String,
    },
    /// End the analysis session.
    Close,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { package } => write!(f, "START {package}"),
            Self::Info { category, id } => match id {
                Some(id) => write!(f, "INFO {category} {id}"),
                None => write!(f, "INFO {category}"),
            },
            Self::Trigger {
                category,
                id,
                payload,
            } => {
                write!(f, "TRIGGER {category}")?;
                if let Some(id) = id {
                    write!(f, " {id}")?;
                }
                if let Some(payload) = payload {
                    write!(f, " {payload}")?;
                }
                Ok(())
            }
            Self::Execute { raw } => write!(f, "EXECUTE {raw}"),
            Self::Close => f.write_str("CLOSE"),
        }
    }
}

/// Decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Correlated reply to an outstanding INFO query.
    Info {
        category: String,
        id: String,
        fields: Vec<Field>,
    },
    /// Asynchronous listener announcement.
    NewListener {
        category: String,
        id: String,
    },
    /// Remote end of session.
    Close,
    /// Unrecognized message kind, passed through uninterpreted.
    Other {
        line: String,
    },
}

impl Inbound {
    /// Decodes one line; returns `None` for blank lines.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let kind = tokens.next()?;

        match kind {
            "INFO" => {
                let category = tokens.next()?.to_string();
                let id = tokens.next().unwrap_or("0").to_string();
                let fields = tokens.filter_map(parse_field).collect();
                Some(Self::Info {
                    category,
                    id,
                    fields,
                })
            }
            "NEW_LISTENER" => {
                let category = tokens.next()?.to_string();
                let id = tokens.next()?.to_string();
                Some(Self::NewListener { category, id })
            }
            "CLOSE" => Some(Self::Close),
            _ => Some(Self::Other {
                line: line.to_string(),
            }),
        }
    }
}

/// Splits one `name:value` token; tokens without a separator are dropped.
fn parse_field(token: &str) -> Option<Field> {
    let (name, value) = token.split_once(':')?;
    Some(Field::new(name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rendering() {
        assert_eq!(
            Command::Start {
                package: "com.example".to_string()
            }
            .to_string(),
            "START com.example"
        );

        assert_eq!(
            Command::Info {
                category: QueryCategory::Location,
                id: Some("42".to_string()),
            }
            .to_string(),
            "INFO location 42"
        );

        assert_eq!(
            Command::Info {
                category: QueryCategory::Time,
                id: None,
            }
            .to_string(),
            "INFO time"
        );

        assert_eq!(
            Command::Trigger {
                category: "sms".to_string(),
                id: Some("0".to_string()),
                payload: Some("senderNumber:\"5551212\"".to_string()),
            }
            .to_string(),
            "TRIGGER sms 0 senderNumber:\"5551212\""
        );

        assert_eq!(
            Command::Trigger {
                category: "boot".to_string(),
                id: None,
                payload: None,
            }
            .to_string(),
            "TRIGGER boot"
        );

        assert_eq!(Command::Close.to_string(), "CLOSE");
    }

    #[test]
    fn test_inbound_info_parses_fields() {
        let msg = Inbound::parse("INFO time 0 time:1718000000").unwrap();
        let Inbound::Info {
            category,
            id,
            fields,
        } = msg
        else {
            panic!("expected info");
        };
        assert_eq!(category, "time");
        assert_eq!(id, "0");
        assert_eq!(fields, vec![Field::new("time", "1718000000")]);
    }

    #[test]
    fn test_inbound_info_skips_malformed_tokens() {
        let msg = Inbound::parse("INFO location 42 lat:37.0 garbage lon:-122.0").unwrap();
        let Inbound::Info { fields, .. } = msg else {
            panic!("expected info");
        };
        assert_eq!(
            fields,
            vec![Field::new("lat", "37.0"), Field::new("lon", "-122.0")]
        );
    }

    #[test]
    fn test_inbound_new_listener() {
        let msg = Inbound::parse("NEW_LISTENER location 42").unwrap();
        assert_eq!(
            msg,
            Inbound::NewListener {
                category: "location".to_string(),
                id: "42".to_string(),
            }
        );
    }

    #[test]
    fn test_inbound_close_and_passthrough() {
        assert_eq!(Inbound::parse("CLOSE"), Some(Inbound::Close));
        assert_eq!(
            Inbound::parse("HEARTBEAT 3"),
            Some(Inbound::Other {
                line: "HEARTBEAT 3".to_string()
            })
        );
        assert_eq!(Inbound::parse("   "), None);
    }
}
