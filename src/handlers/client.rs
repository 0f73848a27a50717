//! Client message handlers

use anyhow::Result;
use async_nats::{Client, Subscriber};
use chrono::{Datelike, Local};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{authorize, respond, AppState};
use crate::services::directory::DirectoryError;
use crate::types::{
    CheckDuplicateRequest, CheckDuplicateResponse, ClientIdRequest, ClientListResponse,
    CreateClientRequest, DeleteClientResponse, ErrorResponse, ListClientsRequest, Request,
    SuccessResponse, UpdateClientRequest,
};

pub(crate) fn directory_error(request_id: Uuid, err: &DirectoryError) -> ErrorResponse {
    if err.status() >= 500 {
        error!("Directory request {} failed: {}", request_id, err);
    } else {
        debug!("Directory request {} rejected: {}", request_id, err);
    }
    ErrorResponse::new(request_id, err.code(), err.to_string())
}

/// Handle spa.client.list messages
pub async fn handle_list(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received client.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ListClientsRequest> = match serde_json::from_slice(&msg.payload) {
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

        let today = Local::now().date_naive();
        match state.directory.list_clients(&request.payload, today).await {
            Ok(clients) => {
                let response = ClientListResponse { clients };
                respond(&client, reply, &SuccessResponse::new(request.id, response)).await?;
            }
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}

/// Handle spa.client.create messages
pub async fn handle_create(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received client.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateClientRequest> = match serde_json::from_slice(&msg.payload) {
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

        let year = Local::now().year();
        match state.directory.create_client(&request.payload, year).await {
            Ok(created) => {
                respond(&client, reply, &SuccessResponse::new(request.id, created)).await?;
            }
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}

/// Handle spa.client.check_duplicate messages
pub async fn handle_check_duplicate(
    client: Client,
    mut subscriber: Subscriber,
    state: AppState,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received client.check_duplicate message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CheckDuplicateRequest> = match serde_json::from_slice(&msg.payload) {
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

        match state.directory.check_duplicate(&request.payload).await {
            Ok(exists) => {
                let response = CheckDuplicateResponse { exists };
                respond(&client, reply, &SuccessResponse::new(request.id, response)).await?;
            }
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}

/// Handle spa.client.get messages
pub async fn handle_get(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received client.get message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ClientIdRequest> = match serde_json::from_slice(&msg.payload) {
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

        match state.directory.get_client(request.payload.client_id).await {
            Ok(found) => respond(&client, reply, &SuccessResponse::new(request.id, found)).await?,
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}

/// Handle spa.client.update messages
pub async fn handle_update(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received client.update message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<UpdateClientRequest> = match serde_json::from_slice(&msg.payload) {
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

        let year = Local::now().year();
        match state.directory.update_client(&request.payload, year).await {
            Ok(updated) => {
                respond(&client, reply, &SuccessResponse::new(request.id, updated)).await?;
            }
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}

/// Handle spa.client.delete messages
pub async fn handle_delete(client: Client, mut subscriber: Subscriber, state: AppState) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received client.delete message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ClientIdRequest> = match serde_json::from_slice(&msg.payload) {
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

        let client_id = request.payload.client_id;
        match state.directory.delete_client(client_id).await {
            Ok(()) => {
                let response = DeleteClientResponse {
                    success: true,
                    client_id,
                };
                respond(&client, reply, &SuccessResponse::new(request.id, response)).await?;
            }
            Err(e) => respond(&client, reply, &directory_error(request.id, &e)).await?,
        }
    }

    Ok(())
}
