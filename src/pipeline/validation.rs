use crate::extract::{Entity, ExtractError};
use crate::pipeline::PipelineError;

/// Checks that every required field holds a value
///
/// An unknown field name is reported before any emptiness check, since it
/// is a configuration error no retry can fix.
pub fn validate_required(entity: &Entity, required: &[String]) -> Result<(), PipelineError> {
    let mut empty = Vec::new();

    for field in required {
        match entity.is_field_empty(field) {
            Ok(true) => empty.push(field.clone()),
            Ok(false) => {}
            Err(ExtractError::UnknownField(name)) => {
                return Err(PipelineError::UnknownRequiredField(name))
            }
            Err(e) => return Err(PipelineError::Extract(e)),
        }
    }

    if empty.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Validation {
            url: entity.url.clone(),
            fields: empty,
        })
    }
}
