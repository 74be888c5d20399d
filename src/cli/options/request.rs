//! Submitting and reviewing certificate requests.

use std::path::PathBuf;
use crate::api::request::{
    CertEnrollmentRequest, CertRequestInfo, CertRequestInfos,
    CertReviewResponse, RequestId, RequestQuery, RequestStatus, RequestType,
    ReviewAction,
};
use crate::cli::client::PkiClient;
use crate::cli::error::Error;
use crate::cli::report::Report;
use crate::commons::httpclient;
use crate::server::csr::PKCS10;
use crate::server::policy::{CERT_REQ_INPUT, SUBJECT_NAME_INPUT};
use super::args::{self, EnrollmentMsg, JsonFile, KeyValue, ReviewMsg};


//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// Submit an enrollment request
    Submit(Submit),

    /// Show the status of a request
    Show(Show),

    /// Show the enrollment template of a profile
    Template(Template),

    /// List requests (agents only)
    List(List),

    /// Review a request or take a review action (agents only)
    Review(Review),
}

impl Command {
    pub async fn run(self, client: &PkiClient) -> Report {
        match self {
            Self::Submit(cmd) => cmd.run(client).await.into(),
            Self::Show(cmd) => cmd.run(client).await.into(),
            Self::Template(cmd) => cmd.run(client).await.into(),
            Self::List(cmd) => cmd.run(client).await.into(),
            Self::Review(cmd) => cmd.run(client).await,
        }
    }
}


//------------ Submit --------------------------------------------------------

#[derive(clap::Args)]
pub struct Submit {
    /// Path to a complete enrollment request in JSON
    #[arg(
        long, short, value_name = "path",
        conflicts_with = "profile",
        required_unless_present = "profile",
    )]
    input: Option<JsonFile<CertEnrollmentRequest, EnrollmentMsg>>,

    /// The profile to enroll with
    #[arg(long, short, requires = "csr")]
    profile: Option<String>,

    /// Path to a PEM encoded PKCS #10 request
    #[arg(long, value_name = "path", requires = "profile")]
    csr: Option<PathBuf>,

    /// Subject name attributes, such as uid=jdoe
    #[arg(long, value_name = "key=value")]
    subject: Vec<KeyValue>,
}

impl Submit {
    pub async fn run(self, client: &PkiClient) -> Result<CertRequestInfos, Error> {
        let request = match (self.input, self.profile, self.csr) {
            (Some(input), _, _) => input.content,
            (None, Some(profile), Some(csr)) => {
                let csr = args::read_text(&csr)?;
                let mut request = client.request_template(&profile).await?;
                fill_template(&mut request, &csr, &self.subject);
                request
            }
            _ => return Err(Error::input("missing --input or --profile")),
        };
        client.request_submit(&request).await.map_err(Into::into)
    }
}

/// Fills the inputs of an enrollment template.
///
/// Subject keys may be given with or without the `sn_` prefix.
fn fill_template(
    request: &mut CertEnrollmentRequest, csr: &str, subject: &[KeyValue]
) {
    request.set_attribute_value(CERT_REQ_INPUT, "cert_request_type", PKCS10);
    request.set_attribute_value(CERT_REQ_INPUT, "cert_request", csr.trim());
    for item in subject {
        let key = item.key.to_ascii_lowercase();
        let key = if key.starts_with("sn_") { key } else { format!("sn_{key}") };
        request.set_attribute_value(SUBJECT_NAME_INPUT, &key, &item.value);
    }
}


//------------ Show ----------------------------------------------------------

#[derive(clap::Args)]
pub struct Show {
    /// The request id
    id: RequestId,
}

impl Show {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<CertRequestInfo, httpclient::Error> {
        client.request_show(self.id).await
    }
}


//------------ Template ------------------------------------------------------

#[derive(clap::Args)]
pub struct Template {
    /// The profile id
    profile: String,
}

impl Template {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<CertEnrollmentRequest, httpclient::Error> {
        client.request_template(&self.profile).await
    }
}


//------------ List ----------------------------------------------------------

#[derive(clap::Args)]
pub struct List {
    /// Only show requests in this state
    #[arg(long)]
    status: Option<RequestStatus>,

    /// Only show requests of this type
    #[arg(long = "type")]
    request_type: Option<RequestType>,

    /// Number of entries to skip
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Maximum number of entries to show
    #[arg(long)]
    size: Option<usize>,
}

impl List {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<CertRequestInfos, httpclient::Error> {
        client.requests_list(&RequestQuery {
            status: self.status,
            request_type: self.request_type,
            start: self.start,
            size: self.size,
        }).await
    }
}


//------------ Review --------------------------------------------------------

#[derive(clap::Args)]
pub struct Review {
    /// The request id
    id: RequestId,

    /// The action to take, shows the request if missing
    #[arg(long, short)]
    action: Option<ReviewAction>,

    /// Path to an edited review to send with the action
    #[arg(long, short, value_name = "path", requires = "action")]
    input: Option<JsonFile<CertReviewResponse, ReviewMsg>>,
}

impl Review {
    pub async fn run(self, client: &PkiClient) -> Report {
        let action = match self.action {
            Some(action) => action,
            None => return client.request_review(self.id).await.into(),
        };
        let review = match self.input {
            Some(input) => input.content,
            None => match client.request_review(self.id).await {
                Ok(review) => review,
                Err(err) => return Report::from_error(err),
            },
        };
        client.request_review_action(self.id, action, &review).await.into()
    }
}


//============ Tests =========================================================
