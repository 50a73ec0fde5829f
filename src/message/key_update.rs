use crate::types::KeyUpdateRequest;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUpdate {
    pub request: KeyUpdateRequest,
}

impl KeyUpdate {
    /// Any value other than 0 or 1 is illegal_parameter (RFC 8446 4.6.3).
    pub fn decode(body: &[u8]) -> Result<KeyUpdate, Error> {
        match body {
            [v] => match KeyUpdateRequest::from_value(*v) {
                KeyUpdateRequest::Unknown(v) => {
                    Err(Error::illegal_parameter(format!("key update request {}", v)))
                }
                request => Ok(KeyUpdate { request }),
            },
            _ => Err(Error::decode("key update length")),
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        self.request.serialize(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlertDescription;

    #[test]
    fn values() {
        assert_eq!(
            KeyUpdate::decode(&[1]).unwrap().request,
            KeyUpdateRequest::UpdateRequested
        );
        let err = KeyUpdate::decode(&[2]).unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::IllegalParameter));
        let err = KeyUpdate::decode(&[0, 0]).unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::DecodeError));
    }
}
