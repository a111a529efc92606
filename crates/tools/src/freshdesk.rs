//! Freshdesk toolkit: helpdesk ticket operations over the Freshdesk v2 REST API.
//!
//! Credential `freshdesk` supplies `freshdeskApiKey` and
//! `helpdeskDomainName`. The domain may be a full URL
//! (`https://acme.freshdesk.com`), a host (`acme.freshdesk.com`) or just
//! the account name (`acme`).

use async_trait::async_trait;
use opsclaw_core::credential::Credentials;
use opsclaw_core::error::{CredentialError, RegistryError, ToolError};
use opsclaw_core::tool::{Tool, ToolInput, ToolRegistry};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::input::{flexible_bool, flexible_id};
use crate::render::{compact, numbered, pick};

pub const CREDENTIAL_API_KEY: &str = "freshdeskApiKey";
pub const CREDENTIAL_DOMAIN: &str = "helpdeskDomainName";

const TICKET_SUMMARY: &[&str] = &["id", "subject", "type", "status", "priority"];
const TICKET_DETAIL: &[&str] = &["id", "subject", "type", "description_text", "status", "priority"];

/// Thin authenticated client for the Freshdesk API.
pub struct FreshdeskClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl FreshdeskClient {
    pub fn new(domain: &str, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: normalize_domain(domain),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self, CredentialError> {
        Ok(Self::new(
            credentials.get(CREDENTIAL_DOMAIN)?,
            credentials.get(CREDENTIAL_API_KEY)?,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and return the status and parsed body (`Null` when empty).
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), ToolError> {
        let url = format!("{}/api/v2{}", self.base_url, path);
        debug!(%method, %url, "Freshdesk request");

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.api_key, Some("X"))
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::transport(format!("Freshdesk request failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::transport(format!("Failed to read Freshdesk response: {e}")))?;
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, value))
    }

    /// Like [`send`](Self::send) but any status other than `expected` is an error.
    async fn expect(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        expected: StatusCode,
    ) -> Result<Value, ToolError> {
        let (status, value) = self.send(method, path, body).await?;
        if status != expected {
            let detail = match &value {
                Value::Null => String::new(),
                Value::String(s) => format!(": {s}"),
                other => format!(": {}", compact(other)),
            };
            return Err(ToolError::remote(format!(
                "Freshdesk returned {}{detail}",
                status.as_u16()
            )));
        }
        Ok(value)
    }
}

fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else if domain.contains('.') {
        format!("https://{domain}")
    } else {
        format!("https://{domain}.freshdesk.com")
    }
}

fn render_list(value: &Value, fields: &[&str], empty: &str) -> String {
    match value.as_array() {
        Some(items) => numbered(items.iter().map(|item| compact(&pick(item, fields))), empty),
        None => compact(value),
    }
}

/// Every Freshdesk operation exposed as a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshdeskOp {
    ListAllTickets,
    CreateTicket,
    ViewTicket,
    UpdateTicket,
    DeleteTicket,
    RestoreTicket,
    GetAssociatedTickets,
    ListAllConversations,
    DeleteMultipleTickets,
    ListTicketFields,
    CreateReply,
    CreateNote,
    AddWatcher,
}

impl FreshdeskOp {
    pub const ALL: [FreshdeskOp; 13] = [
        Self::ListAllTickets,
        Self::CreateTicket,
        Self::ViewTicket,
        Self::UpdateTicket,
        Self::DeleteTicket,
        Self::RestoreTicket,
        Self::GetAssociatedTickets,
        Self::ListAllConversations,
        Self::DeleteMultipleTickets,
        Self::ListTicketFields,
        Self::CreateReply,
        Self::CreateNote,
        Self::AddWatcher,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListAllTickets => "list-all-tickets",
            Self::CreateTicket => "create-ticket",
            Self::ViewTicket => "view-ticket",
            Self::UpdateTicket => "update-ticket",
            Self::DeleteTicket => "delete-ticket",
            Self::RestoreTicket => "restore-ticket",
            Self::GetAssociatedTickets => "get-associated-tickets",
            Self::ListAllConversations => "list-all-conversations",
            Self::DeleteMultipleTickets => "delete-multiple-tickets",
            Self::ListTicketFields => "list-ticket-fields",
            Self::CreateReply => "create-reply",
            Self::CreateNote => "create-note",
            Self::AddWatcher => "add-watcher",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ListAllTickets => {
                "Call this to list out all the Freshdesk tickets. Takes no input. Return a numbered list."
            }
            Self::CreateTicket => {
                "Call this to create a new Freshdesk ticket. Input must be a JSON object with subject (string), \
                 description (string), email (string), type (string), priority (number) and status (number)."
            }
            Self::ViewTicket => {
                "Call this to get details of or show a ticket. Input is the ticketId (a number)."
            }
            Self::UpdateTicket => {
                "Call this to update a ticket. Input must be a JSON object with ticketId (a number) plus the \
                 fields to change, e.g. {\"ticketId\": 12, \"priority\": 3}."
            }
            Self::DeleteTicket => "Call this to delete a ticket. Input is the ticketId (a number).",
            Self::RestoreTicket => {
                "Call this to restore a deleted ticket. Input is the ticketId (a number)."
            }
            Self::GetAssociatedTickets => {
                "Call this to get or list associated tickets of a ticket. Input is the ticketId (a number). \
                 Return a numbered list."
            }
            Self::ListAllConversations => {
                "Call this to list all the conversations of or on a ticket. Input is the ticketId (a number). \
                 Return a numbered list."
            }
            Self::DeleteMultipleTickets => {
                "Call this to delete multiple tickets. Input is a JSON array of ticket ids, e.g. [1, 2, 3]."
            }
            Self::ListTicketFields => {
                "Call this to list all the ticket fields. Takes no input. Return a numbered list."
            }
            Self::CreateReply => {
                "Call this to reply to a ticket. Input must be a JSON object with ticketId (a number) and body (string)."
            }
            Self::CreateNote => {
                "Call this to add a note to a ticket. Input must be a JSON object with ticketId (a number), \
                 body (string) and private (boolean)."
            }
            Self::AddWatcher => {
                "Call this to add a watcher to a ticket. Input must be a JSON object with ticketId (a number) \
                 and userId (a number)."
            }
        }
    }
}

#[derive(Deserialize)]
struct ReplyArgs {
    #[serde(rename = "ticketId", deserialize_with = "flexible_id")]
    ticket_id: u64,
    body: String,
}

#[derive(Deserialize)]
struct NoteArgs {
    #[serde(rename = "ticketId", deserialize_with = "flexible_id")]
    ticket_id: u64,
    body: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    private: bool,
}

#[derive(Deserialize)]
struct WatcherArgs {
    #[serde(rename = "ticketId", deserialize_with = "flexible_id")]
    ticket_id: u64,
    #[serde(rename = "userId", deserialize_with = "flexible_id")]
    user_id: u64,
}

#[derive(Deserialize)]
struct UpdateArgs {
    #[serde(rename = "ticketId", deserialize_with = "flexible_id")]
    ticket_id: u64,
    #[serde(flatten)]
    fields: serde_json::Map<String, Value>,
}

/// One Freshdesk operation bound to a client.
pub struct FreshdeskTool {
    op: FreshdeskOp,
    client: Arc<FreshdeskClient>,
}

impl FreshdeskTool {
    pub fn new(op: FreshdeskOp, client: Arc<FreshdeskClient>) -> Self {
        Self { op, client }
    }

    async fn run(&self, input: &ToolInput) -> Result<String, ToolError> {
        let client = &self.client;
        match self.op {
            FreshdeskOp::ListAllTickets => {
                let tickets = client
                    .expect(Method::GET, "/tickets", None, StatusCode::OK)
                    .await?;
                Ok(render_list(&tickets, TICKET_SUMMARY, "No tickets found."))
            }
            FreshdeskOp::CreateTicket => {
                let ticket: Value = input.json()?;
                if !ticket.is_object() {
                    return Err(ToolError::invalid_input("create-ticket expects a JSON object"));
                }
                let created = client
                    .expect(Method::POST, "/tickets", Some(&ticket), StatusCode::CREATED)
                    .await?;
                Ok(format!(
                    "Ticket successfully created ({}).",
                    compact(&pick(&created, TICKET_DETAIL))
                ))
            }
            FreshdeskOp::ViewTicket => {
                let id = input.integer()?;
                let ticket = client
                    .expect(Method::GET, &format!("/tickets/{id}"), None, StatusCode::OK)
                    .await?;
                Ok(compact(&pick(&ticket, TICKET_DETAIL)))
            }
            FreshdeskOp::UpdateTicket => {
                let args: UpdateArgs = input.json()?;
                if args.fields.is_empty() {
                    return Err(ToolError::invalid_input(
                        "update-ticket needs at least one field to change besides ticketId",
                    ));
                }
                let body = Value::Object(args.fields);
                let updated = client
                    .expect(
                        Method::PUT,
                        &format!("/tickets/{}", args.ticket_id),
                        Some(&body),
                        StatusCode::OK,
                    )
                    .await?;
                Ok(format!(
                    "Ticket successfully updated ({}).",
                    compact(&pick(&updated, TICKET_DETAIL))
                ))
            }
            FreshdeskOp::DeleteTicket => {
                let id = input.integer()?;
                client
                    .expect(Method::DELETE, &format!("/tickets/{id}"), None, StatusCode::NO_CONTENT)
                    .await?;
                Ok(format!("Ticket {id} successfully deleted."))
            }
            FreshdeskOp::RestoreTicket => {
                let id = input.integer()?;
                client
                    .expect(
                        Method::PUT,
                        &format!("/tickets/{id}/restore"),
                        None,
                        StatusCode::NO_CONTENT,
                    )
                    .await?;
                Ok(format!("Ticket {id} successfully restored."))
            }
            FreshdeskOp::GetAssociatedTickets => {
                let id = input.integer()?;
                let tickets = client
                    .expect(
                        Method::GET,
                        &format!("/tickets/{id}/associated_tickets"),
                        None,
                        StatusCode::OK,
                    )
                    .await?;
                Ok(render_list(&tickets, TICKET_SUMMARY, "No associated tickets."))
            }
            FreshdeskOp::ListAllConversations => {
                let id = input.integer()?;
                let conversations = client
                    .expect(
                        Method::GET,
                        &format!("/tickets/{id}/conversations"),
                        None,
                        StatusCode::OK,
                    )
                    .await?;
                Ok(render_list(
                    &conversations,
                    &["id", "from_email", "private", "body_text"],
                    "No conversations on this ticket.",
                ))
            }
            FreshdeskOp::DeleteMultipleTickets => {
                let ids = input.id_list()?;
                let body = serde_json::json!({ "bulk_action": { "ids": ids } });
                let job = client
                    .expect(
                        Method::POST,
                        "/tickets/bulk_delete",
                        Some(&body),
                        StatusCode::ACCEPTED,
                    )
                    .await?;
                Ok(format!(
                    "Deletion of {} tickets accepted ({}).",
                    ids.len(),
                    compact(&job)
                ))
            }
            FreshdeskOp::ListTicketFields => {
                let fields = client
                    .expect(Method::GET, "/ticket_fields", None, StatusCode::OK)
                    .await?;
                Ok(render_list(
                    &fields,
                    &["id", "name", "label", "description"],
                    "No ticket fields defined.",
                ))
            }
            FreshdeskOp::CreateReply => {
                let args: ReplyArgs = input.json()?;
                let body = serde_json::json!({ "body": args.body });
                let reply = client
                    .expect(
                        Method::POST,
                        &format!("/tickets/{}/reply", args.ticket_id),
                        Some(&body),
                        StatusCode::CREATED,
                    )
                    .await?;
                Ok(compact(&pick(&reply, &["id", "user_id", "from_email", "body_text"])))
            }
            FreshdeskOp::CreateNote => {
                let args: NoteArgs = input.json()?;
                let body = serde_json::json!({ "body": args.body, "private": args.private });
                let note = client
                    .expect(
                        Method::POST,
                        &format!("/tickets/{}/notes", args.ticket_id),
                        Some(&body),
                        StatusCode::CREATED,
                    )
                    .await?;
                Ok(compact(&pick(
                    &note,
                    &["id", "user_id", "private", "body_text", "ticket_id"],
                )))
            }
            FreshdeskOp::AddWatcher => {
                let args: WatcherArgs = input.json()?;
                let body = serde_json::json!({ "user_id": args.user_id });
                client
                    .expect(
                        Method::POST,
                        &format!("/tickets/{}/watch", args.ticket_id),
                        Some(&body),
                        StatusCode::NO_CONTENT,
                    )
                    .await?;
                Ok(format!(
                    "User {} is now watching ticket {}.",
                    args.user_id, args.ticket_id
                ))
            }
        }
    }
}

#[async_trait]
impl Tool for FreshdeskTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        self.run(&input).await
    }
}

/// Register every Freshdesk tool against one client.
pub fn toolkit(client: Arc<FreshdeskClient>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    for op in FreshdeskOp::ALL {
        registry.register(Arc::new(FreshdeskTool::new(op, client.clone())))?;
    }
    Ok(registry)
}
