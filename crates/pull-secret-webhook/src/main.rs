use std::sync::Arc;

use clap::Parser;
use pull_secret_webhook::{
    WebhookServer,
    cli::Options,
    logging::initialize_logging,
    provision::SecretProvisioner,
    webhooks::{self, AppState},
};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to construct Kubernetes client"))]
    CreateKubeClient { source: kube::Error },

    #[snafu(display("failed to create webhook server"))]
    CreateWebhookServer { source: pull_secret_webhook::WebhookError },

    #[snafu(display("failed to run webhook server"))]
    RunWebhookServer { source: pull_secret_webhook::WebhookError },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let options = Options::parse();
    initialize_logging("PULL_SECRET_WEBHOOK_LOG");

    tracing::info!(
        bind_address = %options.bind_address,
        source_namespace = %options.source_namespace,
        pull_secret_name = %options.pull_secret_name,
        "starting pull-secret webhook"
    );

    // In-cluster configuration supplies the API server address, the CA
    // bundle and the (periodically re-read) service account bearer token.
    let client = kube::Client::try_default()
        .await
        .context(CreateKubeClientSnafu)?;

    let provisioner = SecretProvisioner::new(
        client,
        options.source_namespace.clone(),
        options.pull_secret_name.clone(),
    );
    let router = webhooks::router(AppState {
        provisioner: Arc::new(provisioner),
    });

    let server = WebhookServer::new(router, &options)
        .await
        .context(CreateWebhookServerSnafu)?;
    server.run().await.context(RunWebhookServerSnafu)
}
