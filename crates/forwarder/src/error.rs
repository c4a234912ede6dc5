#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("forward url must use https: {0}")]
    InsecureUrl(String),
    #[error("forward url is unparseable: {0}")]
    InvalidUrl(String),
    #[error("forward url host {0} matches the configured callback host; refusing to loop")]
    LoopDetected(String),
    #[error("network error forwarding to the destination: {0}")]
    Network(#[from] reqwest::Error),
    #[error("destination responded with {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("destination did not respond after {attempts} attempts")]
    Exhausted { attempts: usize },
}
