use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::crew::CrewService;

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

pub async fn list_tools(service: web::Data<Arc<CrewService>>) -> HttpResponse {
    let tools: Vec<ToolInfo> = service
        .tools()
        .get_definitions()
        .into_iter()
        .map(|d| ToolInfo {
            name: d.name,
            description: d.description,
            parameters: d.parameters,
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({
        "tools": tools,
        "total": tools.len(),
    }))
}

/// Invoke one tool directly, outside of any crew run.
pub async fn invoke_tool(
    service: web::Data<Arc<CrewService>>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse> {
    let name = path.into_inner();
    let tool = service
        .tools()
        .get(&name)
        .ok_or_else(|| AppError::NotFound(format!("Tool '{}' not found", name)))?;

    let result = tool
        .execute(body.into_inner())
        .await
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "tool": name,
        "result": result,
    })))
}
