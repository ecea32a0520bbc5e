use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Block, HistoryEntry, Ledger, LedgerError};

/// Shared ledger handed to every worker
pub type LedgerData = web::Data<Ledger>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,
}

/// Request for the transaction endpoint
///
/// Only used for documentation: the handler accepts any JSON object so that
/// missing fields are reported by the ledger and extra fields pass through.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// Identifier of the vehicle
    #[schema(example = "MH12AB1234")]
    pub vehicle_id: String,

    /// Owner before the transfer
    #[schema(example = "OwnerA")]
    pub previous_owner: String,

    /// Owner after the transfer
    #[schema(example = "OwnerB")]
    pub new_owner: String,

    /// Agreed price
    #[schema(example = 300000)]
    pub price: f64,

    /// Kind of transfer
    #[schema(example = "transfer")]
    pub transaction_type: String,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Response for the validate endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Response for the vehicle history endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    /// The vehicle that was looked up
    pub vehicle_id: String,

    /// Every transaction involving the vehicle, oldest first
    pub history: Vec<HistoryEntry>,
}

/// Body of every error response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Kind of failure, e.g. "ValidationError"
    pub error: String,

    /// Human readable reason
    pub message: String,
}

/// Maps a ledger failure onto an HTTP error response
fn error_response(err: &LedgerError) -> HttpResponse {
    let status = match err {
        LedgerError::Validation(_) | LedgerError::EmptyBuffer => StatusCode::BAD_REQUEST,
        LedgerError::AppendConflict { .. } => StatusCode::CONFLICT,
        LedgerError::InvalidBlock(_) | LedgerError::InvalidChain(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    HttpResponse::build(status).json(ErrorResponse {
        error: err.kind().to_string(),
        message: err.to_string(),
    })
}

/// Turns a body that could not be read as JSON into an error response
///
/// Registered through `web::JsonConfig` so that malformed bodies get the same
/// JSON error shape as ledger failures.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        error: "ValidationError".to_string(),
        message: format!("Invalid JSON body: {}", err),
    });

    InternalError::from_response(err, response).into()
}

/// Get the full chain
///
/// Returns every block in chain order
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(ledger: LedgerData) -> impl Responder {
    let chain = ledger.get_chain();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully")
    )
)]
pub async fn get_pending_transactions(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.get_pending_transactions())
}

/// Submit a new transaction
///
/// Queues an ownership transfer for the next block
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction queued", body = TransactionResponse),
        (status = 400, description = "Missing or invalid field", body = ErrorResponse)
    )
)]
pub async fn new_transaction(
    ledger: LedgerData,
    payload: web::Json<serde_json::Value>,
) -> impl Responder {
    match ledger.add_new_transaction(payload.into_inner()) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", block_index),
            block_index,
        }),
        Err(err) => error_response(&err),
    }
}

/// Mine a new block
///
/// Seals all pending transactions into a new block
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "No transactions to mine", body = ErrorResponse),
        (status = 409, description = "Chain changed while mining", body = ErrorResponse)
    )
)]
pub async fn mine_block(ledger: LedgerData) -> impl Responder {
    // proof of work is CPU bound, keep it off the async workers
    let result = web::block(move || ledger.mine()).await;

    match result {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Forged".to_string(),
            block,
        }),
        Ok(Err(err)) => error_response(&err),
        Err(err) => {
            error!("Mining task failed: {}", err);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "InternalError".to_string(),
                message: "Mining task failed".to_string(),
            })
        }
    }
}

/// Check if the chain is valid
///
/// Validates the ledger's own chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ValidationResponse {
        is_valid: ledger.is_chain_valid(),
    })
}

/// Check if a supplied chain is valid
///
/// Validates the posted chain against the ledger's difficulty
#[utoipa::path(
    post,
    path = "/api/v1/validate",
    request_body = [Block],
    responses(
        (status = 200, description = "Chain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_supplied_chain(
    ledger: LedgerData,
    chain: web::Json<Vec<Block>>,
) -> impl Responder {
    HttpResponse::Ok().json(ValidationResponse {
        is_valid: ledger.is_valid_chain(&chain),
    })
}

/// Get the history of a vehicle
///
/// Returns every transaction involving the vehicle, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/vehicles/{vehicle_id}/history",
    params(
        ("vehicle_id" = String, Path, description = "Identifier of the vehicle")
    ),
    responses(
        (status = 200, description = "Vehicle history retrieved successfully", body = HistoryResponse)
    )
)]
pub async fn get_vehicle_history(
    ledger: LedgerData,
    vehicle_id: web::Path<String>,
) -> impl Responder {
    let vehicle_id = vehicle_id.into_inner();
    let history = ledger.get_vehicle_history(&vehicle_id);

    HttpResponse::Ok().json(HistoryResponse {
        vehicle_id,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::header::ContentType, test, App};
    use serde_json::{json, Value};

    use crate::api::configure_routes;

    fn test_ledger() -> LedgerData {
        web::Data::new(Ledger::with_difficulty(1))
    }

    fn transfer() -> Value {
        json!({
            "vehicle_id": "MH12AB1234",
            "previous_owner": "OwnerA",
            "new_owner": "OwnerB",
            "price": 300000,
            "transaction_type": "transfer"
        })
    }

    #[actix_web::test]
    async fn test_submit_mine_and_query() {
        let ledger = test_ledger();
        let app = test::init_service(
            App::new().app_data(ledger.clone()).configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(transfer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: TransactionResponse = test::read_body_json(resp).await;
        assert_eq!(body.block_index, 1);
        assert_eq!(body.message, "Transaction will be added to Block 1");

        let req = test::TestRequest::post().uri("/api/v1/mine").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "New Block Forged");
        assert_eq!(body["block"]["index"], 1);
        assert_eq!(body["block"]["transactions"][0]["vehicle_id"], "MH12AB1234");

        let req = test::TestRequest::get().uri("/api/v1/chain").to_request();
        let body: ChainResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.length, 2);

        let req = test::TestRequest::get().uri("/api/v1/validate").to_request();
        let body: ValidationResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.is_valid);

        let req = test::TestRequest::get()
            .uri("/api/v1/vehicles/MH12AB1234/history")
            .to_request();
        let body: HistoryResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.vehicle_id, "MH12AB1234");
        assert_eq!(body.history.len(), 1);
        assert_eq!(body.history[0].index, 1);
        assert_eq!(body.history[0].transaction.new_owner, "OwnerB");

        let req = test::TestRequest::get()
            .uri("/api/v1/vehicles/UNKNOWN/history")
            .to_request();
        let body: HistoryResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.history.is_empty());
    }

    #[actix_web::test]
    async fn test_missing_field_is_rejected() {
        let ledger = test_ledger();
        let app = test::init_service(
            App::new().app_data(ledger.clone()).configure(configure_routes),
        )
        .await;

        let mut payload = transfer();
        payload.as_object_mut().unwrap().remove("price");

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "ValidationError");
        assert_eq!(body.message, "Missing field price in transaction");
        assert!(ledger.get_pending_transactions().is_empty());
    }

    #[actix_web::test]
    async fn test_malformed_body_gets_json_error() {
        let ledger = test_ledger();
        let app = test::init_service(
            App::new().app_data(ledger.clone()).configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .insert_header(ContentType::json())
            .set_payload("{\"vehicle_id\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "ValidationError");
        assert!(body.message.starts_with("Invalid JSON body"));
        assert!(ledger.get_pending_transactions().is_empty());

        let req = test::TestRequest::post()
            .uri("/api/v1/validate")
            .insert_header(ContentType::json())
            .set_payload("not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "ValidationError");
    }

    #[actix_web::test]
    async fn test_mine_without_transactions() {
        let ledger = test_ledger();
        let app = test::init_service(
            App::new().app_data(ledger.clone()).configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/mine").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "EmptyBufferError");
        assert_eq!(ledger.len(), 1);
    }

    #[actix_web::test]
    async fn test_validate_supplied_chain() {
        let ledger = test_ledger();
        ledger.add_new_transaction(transfer()).unwrap();
        ledger.mine().unwrap();
        let app = test::init_service(
            App::new().app_data(ledger.clone()).configure(configure_routes),
        )
        .await;

        let mut chain = serde_json::to_value(ledger.get_chain()).unwrap();
        let req = test::TestRequest::post()
            .uri("/api/v1/validate")
            .set_json(&chain)
            .to_request();
        let body: ValidationResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.is_valid);

        chain[1]["transactions"][0]["new_owner"] = json!("Mallory");
        let req = test::TestRequest::post()
            .uri("/api/v1/validate")
            .set_json(&chain)
            .to_request();
        let body: ValidationResponse = test::call_and_read_body_json(&app, req).await;
        assert!(!body.is_valid);
    }
}
