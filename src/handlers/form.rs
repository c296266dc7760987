// Form data processing for the STT service
//
// This module handles the extraction of multipart form data for `POST /transcribe`.
// The upload is buffered in memory; nothing touches the staging area here.

use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use log::debug;

use crate::error::HandlerError;
use crate::pipeline::{AudioUpload, TranscribeRequest};

/// Reads a text field to the end, unmodified
async fn read_text_field(
    field: &mut actix_multipart::Field,
    field_name: &str,
) -> Result<String, HandlerError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| {
            HandlerError::form_error(format!("Error reading field {}: {}", field_name, e))
        })?;
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes)
        .map_err(|_| HandlerError::form_error(format!("Field {} is not valid UTF-8", field_name)))
}

/// Parses the optional beam_size field
///
/// An empty value counts as absent. Positivity is checked by the pipeline.
pub fn parse_beam_size(value: &str) -> Result<Option<i64>, HandlerError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .map(Some)
        .map_err(|_| HandlerError::InvalidBeamSize(value.to_string()))
}

/// Extract and process multipart form data for transcription requests
///
/// # Arguments
///
/// * `form` - The multipart form from the HTTP request
/// * `max_file_size` - Upload size limit in bytes
///
/// # Returns
///
/// * `Result<TranscribeRequest, HandlerError>` - Unvalidated request parameters, or an error
pub async fn extract_form_data(
    mut form: Multipart,
    max_file_size: usize,
) -> Result<TranscribeRequest, HandlerError> {
    let mut request = TranscribeRequest::default();

    while let Some(mut field) = form
        .try_next()
        .await
        .map_err(|e| HandlerError::form_error(format!("Malformed multipart body: {}", e)))?
    {
        let content_disposition = field.content_disposition();
        let field_name = content_disposition
            .and_then(|cd| cd.get_name().map(|name| name.to_string()))
            .unwrap_or_default();
        let filename = content_disposition
            .and_then(|cd| cd.get_filename().map(|name| name.to_string()));

        match field_name.as_str() {
            "file" => {
                let mut data = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| {
                        HandlerError::form_error(format!("Error processing file upload: {}", e))
                    })?;

                    if data.len() + chunk.len() > max_file_size {
                        return Err(HandlerError::FileTooLarge(
                            data.len() + chunk.len(),
                            max_file_size,
                        ));
                    }
                    data.extend_from_slice(&chunk);
                }

                debug!(
                    "Received upload {:?} ({} bytes)",
                    filename.as_deref().unwrap_or(""),
                    data.len()
                );
                request.upload = Some(AudioUpload { data, filename });
            }
            "language" => {
                let value = read_text_field(&mut field, "language").await?;
                request.language = Some(value).filter(|v| !v.is_empty());
            }
            "beam_size" => {
                let value = read_text_field(&mut field, "beam_size").await?;
                request.beam_size = parse_beam_size(&value)?;
            }
            _ => {
                // Skip unknown fields
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| {
                        HandlerError::form_error(format!("Error reading field: {}", e))
                    })?;
                }
            }
        }
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_beam_size() {
        assert_eq!(parse_beam_size("5").unwrap(), Some(5));
        assert_eq!(parse_beam_size(" 2 ").unwrap(), Some(2));
        assert_eq!(parse_beam_size("").unwrap(), None);
        // Range is checked later; only integers are accepted here
        assert_eq!(parse_beam_size("-1").unwrap(), Some(-1));
        assert!(matches!(
            parse_beam_size("wide"),
            Err(HandlerError::InvalidBeamSize(_))
        ));
        assert!(parse_beam_size("2.5").is_err());
    }
}
