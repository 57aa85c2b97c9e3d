//! REST client tests against a wiremock server.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use record_migrate::{ApiFailure, ClientConfig, Connection, Record, RemoteApi, RestClient};

const BASE: &str = "/services/data/v59.0";

fn client(server: &MockServer, max_retries: u32) -> RestClient {
    let connection = Connection::new(server.uri(), "test-token");
    let config = ClientConfig {
        max_retries,
        ..ClientConfig::default()
    };
    RestClient::new(&connection, &config).unwrap()
}

#[tokio::test]
async fn test_identity_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/", BASE)))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "identity": "ops@acme.example" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let identity = client(&server, 0).identity().await.unwrap();
    assert_eq!(identity.display_name.as_deref(), Some("ops@acme.example"));
}

#[tokio::test]
async fn test_describe_parses_field_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects/Contact/describe", BASE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Contact",
            "fields": [
                { "name": "Id", "type": "id", "createable": false, "updateable": false },
                { "name": "LastName", "type": "string", "createable": true, "updateable": true },
                {
                    "name": "AccountId", "type": "reference", "createable": true,
                    "updateable": true, "referenceTo": ["Account"], "relationshipName": "Account"
                },
                { "name": "Legacy_Id__c", "type": "string", "createable": true, "externalId": true },
                { "name": "Score__c", "type": "double", "createable": false, "calculated": true }
            ]
        })))
        .mount(&server)
        .await;

    let schema = client(&server, 0).describe("Contact").await.unwrap();

    assert_eq!(schema.name, "Contact");
    assert_eq!(schema.fields.len(), 5);
    let references: Vec<&str> = schema.reference_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(references, vec!["AccountId"]);
    assert!(schema.field("Legacy_Id__c").unwrap().is_external_id);
    assert!(!schema.accepts_on_create("Score__c"));
    assert!(!schema.accepts_on_create("Id"));
}

#[tokio::test]
async fn test_describe_error_body_becomes_structured_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects/Nope/describe", BASE)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!([
            { "message": "The requested resource does not exist", "errorCode": "NOT_FOUND" }
        ])))
        .mount(&server)
        .await;

    let failure = client(&server, 3).describe("Nope").await.unwrap_err();
    assert_eq!(
        failure,
        ApiFailure::structured("The requested resource does not exist", Some("NOT_FOUND"), vec![])
    );
}

#[tokio::test]
async fn test_query_passes_soql_and_strips_attributes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query", BASE)))
        .and(query_param("q", "SELECT Id, Name FROM Account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 2500,
            "done": false,
            "nextRecordsUrl": "/services/data/v59.0/query/01gxx-2000",
            "records": [
                { "attributes": { "type": "Account", "url": "/x/001A" }, "Id": "001A", "Name": "Acme" },
                { "attributes": { "type": "Account", "url": "/x/001B" }, "Id": "001B", "Name": "Globex" }
            ]
        })))
        .mount(&server)
        .await;

    let page = client(&server, 0)
        .query("SELECT Id, Name FROM Account")
        .await
        .unwrap();

    assert_eq!(page.total_size, 2500);
    assert!(!page.done);
    assert_eq!(page.records.len(), 2);
    assert!(!page.records[0].contains("attributes"));
    assert_eq!(page.records[1].get_str("Name"), Some("Globex"));
}

#[tokio::test]
async fn test_create_single_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/sobjects/Account", BASE)))
        .and(body_json(json!({ "Name": "Acme" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": "001X", "success": true, "errors": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, 0)
        .create("Account", &Record::new().with("Name", "Acme"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.id.as_deref(), Some("001X"));
}

#[tokio::test]
async fn test_create_many_reports_each_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/composite/sobjects", BASE)))
        .and(body_json(json!({
            "allOrNone": false,
            "records": [
                { "attributes": { "type": "Account" }, "Name": "Acme" },
                { "attributes": { "type": "Account" }, "Phone": "555" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "001X", "success": true, "errors": [] },
            {
                "success": false,
                "errors": [{
                    "message": "Required fields are missing: [Name]",
                    "statusCode": "REQUIRED_FIELD_MISSING",
                    "fields": ["Name"]
                }]
            }
        ])))
        .mount(&server)
        .await;

    let records = vec![
        Record::new().with("Name", "Acme"),
        Record::new().with("Phone", "555"),
    ];
    let results = client(&server, 0)
        .create_many("Account", &records)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(
        results[1].failure().to_string(),
        "REQUIRED_FIELD_MISSING: Required fields are missing: [Name] [fields: Name]"
    );
}

#[tokio::test]
async fn test_reads_are_retried_on_transient_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects", BASE)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects", BASE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sobjects": [
                { "name": "Account", "custom": false, "queryable": true, "createable": true },
                { "name": "AccountHistory", "queryable": true, "createable": false }
            ]
        })))
        .mount(&server)
        .await;

    let entities = client(&server, 1).describe_global().await.unwrap();

    assert_eq!(entities.len(), 2);
    assert!(!entities[1].creatable);
}

#[tokio::test]
async fn test_reads_give_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects", BASE)))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(2)
        .mount(&server)
        .await;

    let failure = client(&server, 1).describe_global().await.unwrap_err();
    assert_eq!(failure.status(), Some(503));
}

#[tokio::test]
async fn test_creates_are_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/composite/sobjects", BASE)))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let records = vec![Record::new().with("Name", "A"), Record::new().with("Name", "B")];
    let failure = client(&server, 3)
        .create_many("Account", &records)
        .await
        .unwrap_err();

    assert_eq!(
        failure,
        ApiFailure::Http {
            status: 503,
            message: "Service Unavailable".to_string()
        }
    );
}
