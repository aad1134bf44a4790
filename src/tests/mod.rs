#[cfg(test)]
mod tests {
    use actix_web::{test, web, App};
    use async_trait::async_trait;
    use std::sync::Arc;

    use crate::handlers;
    use crate::services::agent::provider::{AgentResponse, LLMProvider, Message};
    use crate::services::agent::tools::{PopulationDataTool, ToolDefinition};
    use crate::services::agent::{AgentError, ToolRegistry};
    use crate::services::population::PopulationSource;
    use crate::services::CrewService;
    use crate::error::ToolError;
    use crate::models::{Population, PopulationRecord};

    /// Answers every turn with a fixed markdown table.
    struct TableProvider;

    #[async_trait]
    impl LLMProvider for TableProvider {
        async fn generate(
            &self,
            _messages: Vec<Message>,
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<AgentResponse, AgentError> {
            Ok(AgentResponse {
                content: "| Name | Website | Distance | City | State |".to_string(),
                tool_calls: vec![],
                finish_reason: "stop".to_string(),
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LLMProvider for FailingProvider {
        async fn generate(
            &self,
            _messages: Vec<Message>,
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<AgentResponse, AgentError> {
            Err(AgentError::Provider("quota exceeded".to_string()))
        }
    }

    struct FixedPopulation;

    #[async_trait]
    impl PopulationSource for FixedPopulation {
        async fn lookup(&self, city: &str, state: &str) -> Result<PopulationRecord, ToolError> {
            if city == "Los Angeles" {
                Ok(PopulationRecord {
                    city: city.to_string(),
                    state: state.to_string(),
                    population: Population::Known(3_898_747),
                })
            } else {
                Err(ToolError::NotFound(city.to_string()))
            }
        }
    }

    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PopulationDataTool::new(Arc::new(FixedPopulation))));
        Arc::new(registry)
    }

    fn service_with(provider: Arc<dyn LLMProvider>) -> Arc<CrewService> {
        Arc::new(CrewService::new(provider, tools(), 5))
    }

    fn well_formed_body() -> serde_json::Value {
        serde_json::json!({
            "zipcode": "90210",
            "dealership": "Sunset Toyota",
            "customer": "Acme Holdings",
            "person": "Jordan"
        })
    }

    #[actix_rt::test]
    async fn test_run_routes_return_result() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service_with(Arc::new(TableProvider))))
                .configure(handlers::configure)
        ).await;

        for uri in ["/run-competitor", "/run-opportunity"] {
            let req = test::TestRequest::post()
                .uri(uri)
                .set_json(well_formed_body())
                .to_request();

            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), 200, "route {}", uri);

            let body: serde_json::Value = test::read_body_json(resp).await;
            assert!(body["result"].as_str().unwrap().contains("| Name |"));
        }
    }

    #[actix_rt::test]
    async fn test_missing_field_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service_with(Arc::new(TableProvider))))
                .configure(handlers::configure)
        ).await;

        let req = test::TestRequest::post()
            .uri("/run-competitor")
            .set_json(serde_json::json!({
                "zipcode": "90210",
                "dealership": "Sunset Toyota",
                "customer": "Acme Holdings"
            }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("person"));
    }

    #[actix_rt::test]
    async fn test_malformed_zipcode_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service_with(Arc::new(TableProvider))))
                .configure(handlers::configure)
        ).await;

        let mut body = well_formed_body();
        body["zipcode"] = serde_json::json!("not-a-zip");
        let req = test::TestRequest::post()
            .uri("/run-opportunity")
            .set_json(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_rt::test]
    async fn test_provider_failure_is_bad_gateway() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service_with(Arc::new(FailingProvider))))
                .configure(handlers::configure)
        ).await;

        let req = test::TestRequest::post()
            .uri("/run-competitor")
            .set_json(well_formed_body())
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 502);
    }

    #[actix_rt::test]
    async fn test_missing_credentials_is_service_unavailable() {
        let service = Arc::new(CrewService::without_provider("GEMINI_API_KEY is not set", tools()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .configure(handlers::configure)
        ).await;

        let req = test::TestRequest::post()
            .uri("/run-opportunity")
            .set_json(well_formed_body())
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 503);
    }

    #[actix_rt::test]
    async fn test_tools_can_be_listed_and_invoked() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service_with(Arc::new(TableProvider))))
                .configure(handlers::configure)
        ).await;

        let req = test::TestRequest::get().uri("/tools").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["tools"][0]["name"], "population_lookup");

        let req = test::TestRequest::post()
            .uri("/tools/population_lookup")
            .set_json(serde_json::json!({ "city": "Los Angeles", "state": "CA" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["result"]["population"], 3_898_747);

        let req = test::TestRequest::post()
            .uri("/tools/population_lookup")
            .set_json(serde_json::json!({ "city": "Gotham", "state": "NJ" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["result"]["population"], "unknown");

        let req = test::TestRequest::post()
            .uri("/tools/teleporter")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[actix_rt::test]
    async fn test_health_check() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service_with(Arc::new(TableProvider))))
                .configure(handlers::configure)
        ).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
    }
}
