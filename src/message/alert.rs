use nom::IResult;

use crate::codec::parse_all;
use crate::types::{AlertDescription, AlertLevel};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Alert {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub fn warning(description: AlertDescription) -> Self {
        Alert {
            level: AlertLevel::Warning,
            description,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Alert> {
        let (input, level) = AlertLevel::parse(input)?;
        let (input, description) = AlertDescription::parse(input)?;
        Ok((input, Alert { level, description }))
    }

    /// An alert record holds exactly one alert.
    pub fn decode(record: &[u8]) -> Result<Alert, Error> {
        parse_all(record, "alert", Alert::parse)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        self.level.serialize(out);
        self.description.serialize(out);
    }
}
