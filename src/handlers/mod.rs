//! NATS message handlers

pub mod branch;
pub mod client;
pub mod document;
pub mod import;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tokio::select;
use tracing::{error, info, warn};

use crate::auth::{self, AuthInfo};
use crate::services::directory::ClientDirectory;
use crate::services::documents::DocumentService;
use crate::services::import_processor::ImportProcessor;
use crate::types::{ErrorResponse, Request};

pub const SUBJECT_PING: &str = "spa.ping";
pub const SUBJECT_IMPORT_UPLOAD: &str = "spa.import.upload";
pub const SUBJECT_IMPORT_PROCESS: &str = "spa.import.process";
pub const SUBJECT_IMPORT_GET: &str = "spa.import.get";
pub const SUBJECT_IMPORT_HISTORY: &str = "spa.import.history";
pub const SUBJECT_CLIENT_LIST: &str = "spa.client.list";
pub const SUBJECT_CLIENT_CREATE: &str = "spa.client.create";
pub const SUBJECT_CLIENT_CHECK_DUPLICATE: &str = "spa.client.check_duplicate";
pub const SUBJECT_CLIENT_GET: &str = "spa.client.get";
pub const SUBJECT_CLIENT_UPDATE: &str = "spa.client.update";
pub const SUBJECT_CLIENT_DELETE: &str = "spa.client.delete";
pub const SUBJECT_BRANCH_LIST: &str = "spa.branch.list";
pub const SUBJECT_BRANCH_CREATE: &str = "spa.branch.create";
pub const SUBJECT_DOCUMENT_UPLOAD: &str = "spa.document.upload";

/// Shared services handed to every handler task
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<ClientDirectory>,
    pub imports: Arc<ImportProcessor>,
    pub documents: Arc<DocumentService>,
    pub jwt_secret: String,
}

/// Serialize and publish a reply. A failed publish is logged only.
pub(crate) async fn respond<T: Serialize>(client: &Client, reply: Subject, body: &T) -> Result<()> {
    let bytes = serde_json::to_vec(body)?;
    if let Err(e) = client.publish(reply, bytes.into()).await {
        warn!("Failed to publish reply: {}", e);
    }
    Ok(())
}

/// Token check shared by every authenticated subject
pub(crate) fn authorize<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthInfo, ErrorResponse> {
    auth::extract_auth(request, jwt_secret).map_err(|e| {
        warn!("Rejected request {}: {}", request.id, e);
        ErrorResponse::new(request.id, "UNAUTHORIZED", "Authentication required")
    })
}

/// Start all message handlers
pub async fn start_handlers(client: Client, state: AppState) -> Result<()> {
    info!("Starting message handlers...");

    // Subscribe to all subjects
    let ping_sub = client.subscribe(SUBJECT_PING).await?;
    let import_upload_sub = client.subscribe(SUBJECT_IMPORT_UPLOAD).await?;
    let import_process_sub = client.subscribe(SUBJECT_IMPORT_PROCESS).await?;
    let import_get_sub = client.subscribe(SUBJECT_IMPORT_GET).await?;
    let import_history_sub = client.subscribe(SUBJECT_IMPORT_HISTORY).await?;
    let client_list_sub = client.subscribe(SUBJECT_CLIENT_LIST).await?;
    let client_create_sub = client.subscribe(SUBJECT_CLIENT_CREATE).await?;
    let client_check_sub = client.subscribe(SUBJECT_CLIENT_CHECK_DUPLICATE).await?;
    let client_get_sub = client.subscribe(SUBJECT_CLIENT_GET).await?;
    let client_update_sub = client.subscribe(SUBJECT_CLIENT_UPDATE).await?;
    let client_delete_sub = client.subscribe(SUBJECT_CLIENT_DELETE).await?;
    let branch_list_sub = client.subscribe(SUBJECT_BRANCH_LIST).await?;
    let branch_create_sub = client.subscribe(SUBJECT_BRANCH_CREATE).await?;
    let document_upload_sub = client.subscribe(SUBJECT_DOCUMENT_UPLOAD).await?;

    info!("Subscribed to NATS subjects");

    let ping_handle = tokio::spawn(ping::handle_ping(client.clone(), ping_sub));

    let import_upload_handle =
        tokio::spawn(import::handle_upload(client.clone(), import_upload_sub, state.clone()));
    let import_process_handle =
        tokio::spawn(import::handle_process(client.clone(), import_process_sub, state.clone()));
    let import_get_handle =
        tokio::spawn(import::handle_get(client.clone(), import_get_sub, state.clone()));
    let import_history_handle =
        tokio::spawn(import::handle_history(client.clone(), import_history_sub, state.clone()));

    let client_list_handle =
        tokio::spawn(client::handle_list(client.clone(), client_list_sub, state.clone()));
    let client_create_handle =
        tokio::spawn(client::handle_create(client.clone(), client_create_sub, state.clone()));
    let client_check_handle = tokio::spawn(client::handle_check_duplicate(
        client.clone(),
        client_check_sub,
        state.clone(),
    ));
    let client_get_handle =
        tokio::spawn(client::handle_get(client.clone(), client_get_sub, state.clone()));
    let client_update_handle =
        tokio::spawn(client::handle_update(client.clone(), client_update_sub, state.clone()));
    let client_delete_handle =
        tokio::spawn(client::handle_delete(client.clone(), client_delete_sub, state.clone()));

    let branch_list_handle =
        tokio::spawn(branch::handle_list(client.clone(), branch_list_sub, state.clone()));
    let branch_create_handle =
        tokio::spawn(branch::handle_create(client.clone(), branch_create_sub, state.clone()));

    let document_upload_handle =
        tokio::spawn(document::handle_upload(client, document_upload_sub, state));

    info!("All handlers started");

    // Any handler exiting means its subscription is gone
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = import_upload_handle => {
            error!("Import upload handler finished: {:?}", result);
        }
        result = import_process_handle => {
            error!("Import process handler finished: {:?}", result);
        }
        result = import_get_handle => {
            error!("Import get handler finished: {:?}", result);
        }
        result = import_history_handle => {
            error!("Import history handler finished: {:?}", result);
        }
        result = client_list_handle => {
            error!("Client list handler finished: {:?}", result);
        }
        result = client_create_handle => {
            error!("Client create handler finished: {:?}", result);
        }
        result = client_check_handle => {
            error!("Client duplicate check handler finished: {:?}", result);
        }
        result = client_get_handle => {
            error!("Client get handler finished: {:?}", result);
        }
        result = client_update_handle => {
            error!("Client update handler finished: {:?}", result);
        }
        result = client_delete_handle => {
            error!("Client delete handler finished: {:?}", result);
        }
        result = branch_list_handle => {
            error!("Branch list handler finished: {:?}", result);
        }
        result = branch_create_handle => {
            error!("Branch create handler finished: {:?}", result);
        }
        result = document_upload_handle => {
            error!("Document upload handler finished: {:?}", result);
        }
    }

    Ok(())
}
