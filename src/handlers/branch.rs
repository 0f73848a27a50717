//! Branch message handlers

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::client::directory_error;
use super::{authorize, respond, AppState};
use crate::types::{
    BranchListResponse, CreateBranchRequest, EmptyPayload, ErrorResponse, Request, SuccessResponse,
};

/// Handle spa.branch.list messages
pub async fn handle_list(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received branch.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<EmptyPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                respond(&client, reply, &error).await?;
                continue;
            }
        };

        if let Err(error) = authorize(&request, &state.jwt_secret) {
            respond(&client, reply, &error).await?;
            continue;
        }

        match state.directory.list_branches().await {
            Ok(branches) => {
                let response = BranchListResponse { branches };
                respond(&client, reply, &SuccessResponse::new(request.id, response)).await?;
            }
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}

/// Handle spa.branch.create messages (admin only)
pub async fn handle_create(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received branch.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateBranchRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                respond(&client, reply, &error).await?;
                continue;
            }
        };

        let auth_info = match authorize(&request, &state.jwt_secret) {
            Ok(info) => info,
            Err(error) => {
                respond(&client, reply, &error).await?;
                continue;
            }
        };
        if !auth_info.is_admin() {
            let error = ErrorResponse::new(request.id, "FORBIDDEN", "Creating branches requires admin role");
            respond(&client, reply, &error).await?;
            continue;
        }

        match state.directory.create_branch(&request.payload.name).await {
            Ok(branch) => respond(&client, reply, &SuccessResponse::new(request.id, branch)).await?,
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}
