use crate::Error;

/// Finished carries nothing but the verify data. Its length depends on the
/// version and suite, so the body is taken whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn decode(body: &[u8], expected_len: usize) -> Result<Finished, Error> {
        if body.len() != expected_len {
            return Err(Error::decode(format!(
                "finished length {} expected {}",
                body.len(),
                expected_len
            )));
        }
        Ok(Finished {
            verify_data: body.to_vec(),
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.verify_data);
    }
}
