use flowbridge_client_state::MAX_CLIENT_STATE_LEN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateSubscriptionValidationError {
    #[error("resource path does not match the platform's expected grammar: {0}")]
    MalformedResource(String),
    #[error("callback url must use https: {0}")]
    InsecureCallback(String),
    #[error("client_state is {actual} characters, exceeding the {max} character limit")]
    ClientStateTooLong { actual: usize, max: usize },
}

/// The platform's resource path grammar: one or more non-empty segments
/// separated by `/`, e.g. `sites/contoso/lists/Invoices`. No leading or
/// trailing slash, no empty segment.
pub fn validate_resource(resource: &str) -> Result<(), CreateSubscriptionValidationError> {
    let valid = !resource.is_empty()
        && !resource.starts_with('/')
        && !resource.ends_with('/')
        && resource.split('/').all(|segment| !segment.is_empty());
    if valid {
        Ok(())
    } else {
        Err(CreateSubscriptionValidationError::MalformedResource(resource.to_string()))
    }
}

pub fn validate_callback_url(url: &str) -> Result<(), CreateSubscriptionValidationError> {
    if url.starts_with("https://") {
        Ok(())
    } else {
        Err(CreateSubscriptionValidationError::InsecureCallback(url.to_string()))
    }
}

pub fn validate_client_state_len(client_state: &str) -> Result<(), CreateSubscriptionValidationError> {
    if client_state.len() <= MAX_CLIENT_STATE_LEN {
        Ok(())
    } else {
        Err(CreateSubscriptionValidationError::ClientStateTooLong {
            actual: client_state.len(),
            max: MAX_CLIENT_STATE_LEN,
        })
    }
}

pub fn validate_create_request(
    resource: &str,
    callback_url: &str,
    client_state: &str,
) -> Result<(), CreateSubscriptionValidationError> {
    validate_resource(resource)?;
    validate_callback_url(callback_url)?;
    validate_client_state_len(client_state)?;
    Ok(())
}
