use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{is_valid_zipcode, CrewInput, CrewOutput};
use crate::services::crew::{CrewKind, CrewService};

fn validate(input: &CrewInput) -> Result<()> {
    for (field, value) in input.as_pairs() {
        if value.trim().is_empty() {
            return Err(AppError::ValidationError(format!("{} must not be empty", field)));
        }
    }

    if !is_valid_zipcode(&input.zipcode) {
        return Err(AppError::ValidationError(format!(
            "zipcode '{}' is not a US zipcode (NNNNN or NNNNN-NNNN)",
            input.zipcode
        )));
    }

    Ok(())
}

async fn run_crew(
    kind: CrewKind,
    service: &CrewService,
    input: CrewInput,
) -> Result<HttpResponse> {
    validate(&input)?;

    log::info!(
        "Running {:?} crew for {} ({}) on behalf of {} / {}",
        kind,
        input.dealership,
        input.zipcode,
        input.customer,
        input.person
    );

    let result = service.run(kind, &input).await.map_err(|e| {
        log::error!("{:?} crew failed for {}: {}", kind, input.dealership, e);
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(CrewOutput { result }))
}

pub async fn run_competitor(
    service: web::Data<Arc<CrewService>>,
    body: web::Json<CrewInput>,
) -> Result<HttpResponse> {
    run_crew(CrewKind::Competitor, service.get_ref(), body.into_inner()).await
}

pub async fn run_opportunity(
    service: web::Data<Arc<CrewService>>,
    body: web::Json<CrewInput>,
) -> Result<HttpResponse> {
    run_crew(CrewKind::Opportunity, service.get_ref(), body.into_inner()).await
}
