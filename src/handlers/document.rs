//! Membership document handlers

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{authorize, respond, AppState};
use crate::types::{DocumentUploadRequest, ErrorResponse, Request, SuccessResponse};

/// Handle spa.document.upload messages
pub async fn handle_upload(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received document.upload message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<DocumentUploadRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse document upload request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                respond(&client, reply, &error).await?;
                continue;
            }
        };

        if let Err(error) = authorize(&request, &state.jwt_secret) {
            respond(&client, reply, &error).await?;
            continue;
        }

        match state.documents.upload(request.payload).await {
            Ok(response) => {
                respond(&client, reply, &SuccessResponse::new(request.id, response)).await?;
            }
            Err(e) => {
                if e.status() >= 500 {
                    error!("Document upload {} failed: {}", request.id, e);
                }
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                respond(&client, reply, &error).await?;
            }
        }
    }

    Ok(())
}
