//! Options relating to the server as a whole.

use crate::api::admin::ServerInfo;
use crate::api::status::Success;
use crate::cli::client::PkiClient;
use crate::commons::httpclient;


//------------ Health --------------------------------------------------------

#[derive(clap::Parser)]
pub struct Health;

impl Health {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<Success, httpclient::Error> {
        client.health().await
    }
}


//------------ Info ----------------------------------------------------------

#[derive(clap::Parser)]
pub struct Info;

impl Info {
    pub async fn run(
        self, client: &PkiClient
    ) -> Result<ServerInfo, httpclient::Error> {
        client.info().await
    }
}
