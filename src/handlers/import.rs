//! Client import message handlers

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{authorize, respond, AppState};
use crate::error::ImportError;
use crate::types::{
    ErrorResponse, GetJobRequest, ImportHistoryRequest, ProcessJobRequest, Request,
    SuccessResponse, UploadRequest,
};

fn import_error(request_id: Uuid, err: &ImportError) -> ErrorResponse {
    if err.status() >= 500 {
        error!("Import request {} failed: {}", request_id, err);
    } else {
        debug!("Import request {} rejected: {}", request_id, err);
    }
    ErrorResponse::new(request_id, err.code(), err.to_string())
}

/// Handle spa.import.upload messages
pub async fn handle_upload(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.upload message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<UploadRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse upload request: {}", e);
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

        match state
            .imports
            .upload(Some(&auth_info.user_id), request.payload)
            .await
        {
            Ok(response) => {
                respond(&client, reply, &SuccessResponse::new(request.id, response)).await?;
            }
            Err(e) => {
                respond(&client, reply, &import_error(request.id, &e)).await?;
            }
        }
    }

    Ok(())
}

/// Handle spa.import.process messages
///
/// Safe to send repeatedly; a running or completed job is reported, not rerun.
pub async fn handle_process(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.process message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ProcessJobRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse process request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                respond(&client, reply, &error).await?;
                continue;
            }
        };

        if let Err(error) = authorize(&request, &state.jwt_secret) {
            respond(&client, reply, &error).await?;
            continue;
        }

        // Runs can be long; keep serving other triggers meanwhile
        let imports = state.imports.clone();
        let client = client.clone();
        tokio::spawn(async move {
            let result = match imports.process(request.payload.job_id).await {
                Ok(response) => respond(&client, reply, &SuccessResponse::new(request.id, response)).await,
                Err(e) => respond(&client, reply, &import_error(request.id, &e)).await,
            };
            if let Err(e) = result {
                error!("Failed to reply to process request {}: {}", request.id, e);
            }
        });
    }

    Ok(())
}

/// Handle spa.import.get messages
pub async fn handle_get(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.get message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<GetJobRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse job request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                respond(&client, reply, &error).await?;
                continue;
            }
        };

        if let Err(error) = authorize(&request, &state.jwt_secret) {
            respond(&client, reply, &error).await?;
            continue;
        }

        match state.imports.get_job(request.payload.job_id).await {
            Ok(job) => respond(&client, reply, &SuccessResponse::new(request.id, job)).await?,
            Err(e) => respond(&client, reply, &import_error(request.id, &e)).await?,
        }
    }

    Ok(())
}

/// Handle spa.import.history messages
pub async fn handle_history(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.history message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ImportHistoryRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse history request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                respond(&client, reply, &error).await?;
                continue;
            }
        };

        if let Err(error) = authorize(&request, &state.jwt_secret) {
            respond(&client, reply, &error).await?;
            continue;
        }

        let ImportHistoryRequest { limit, status } = request.payload;
        match state.imports.history(limit, status).await {
            Ok(history) => respond(&client, reply, &SuccessResponse::new(request.id, history)).await?,
            Err(e) => respond(&client, reply, &import_error(request.id, &e)).await?,
        }
    }

    Ok(())
}
