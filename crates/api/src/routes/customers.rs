//! Customer CRUD, child collection and lookup endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{ChildKind, CustomerId};
use domain::{
    Customer, CustomerDetails, CustomerPatch, CustomerService, CustomerStore, Deadline,
    NewCustomer,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Header overriding the default request deadline, in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Shared application state accessible from all handlers.
pub struct AppState<S: CustomerStore> {
    pub customer_service: CustomerService<S>,
    pub request_timeout: Duration,
}

impl<S: CustomerStore> AppState<S> {
    /// Builds the deadline for a request, honouring the timeout header.
    fn deadline(&self, headers: &HeaderMap) -> Result<Deadline, ApiError> {
        let Some(value) = headers.get(REQUEST_TIMEOUT_HEADER) else {
            return Ok(Deadline::after(self.request_timeout));
        };
        let millis = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Invalid {REQUEST_TIMEOUT_HEADER}: expected a positive integer"
                ))
            })?;
        Ok(Deadline::after(Duration::from_millis(millis)))
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub date_of_birth: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCustomerWithDetailsRequest {
    pub name: String,
    pub date_of_birth: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
}

#[derive(Deserialize)]
pub struct AddEmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct AddPhoneNumberRequest {
    pub phone_number: String,
}

#[derive(Deserialize)]
pub struct AddAddressRequest {
    pub address: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CustomerResponse {
    pub id: i64,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub addresses: Vec<String>,
}

impl From<Customer> for CustomerResponse {
    fn from(customer: Customer) -> Self {
        Self {
            emails: customer.values(ChildKind::Email),
            phone_numbers: customer.values(ChildKind::PhoneNumber),
            addresses: customer.values(ChildKind::Address),
            id: customer.id.as_i64(),
            name: customer.name,
            date_of_birth: customer.date_of_birth,
        }
    }
}

#[derive(Serialize)]
pub struct CustomerCreatedResponse {
    pub id: i64,
}

#[derive(Serialize)]
pub struct CustomerListResponse {
    pub customers: Vec<CustomerResponse>,
}

#[derive(Serialize)]
pub struct ChildCreatedResponse {
    pub id: i64,
    pub customer_id: i64,
}

#[derive(Serialize)]
pub struct EmailsResponse {
    pub emails: Vec<String>,
}

#[derive(Serialize)]
pub struct PhoneNumbersResponse {
    pub phone_numbers: Vec<String>,
}

#[derive(Serialize)]
pub struct AddressesResponse {
    pub addresses: Vec<String>,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

const SUCCESS: SuccessResponse = SuccessResponse { success: true };

// -- Customer handlers --

/// POST /customers: create a customer without children.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerCreatedResponse>), ApiError> {
    let deadline = state.deadline(&headers)?;
    let customer = state
        .customer_service
        .create_customer(deadline, new_customer(req.name, req.date_of_birth))
        .await?;

    let response = CustomerCreatedResponse {
        id: customer.id.as_i64(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /customers/with-details: create a customer and its children atomically.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create_with_details<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateCustomerWithDetailsRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), ApiError> {
    let deadline = state.deadline(&headers)?;

    let mut details = CustomerDetails::new(new_customer(req.name, req.date_of_birth));
    details.email = req.email;
    details.phone_number = req.phone_number;
    details.address = req.address;

    let customer = state
        .customer_service
        .create_customer_with_details(deadline, details)
        .await?;
    Ok((StatusCode::CREATED, Json(customer.into())))
}

/// GET /customers: list every customer with its children.
#[tracing::instrument(skip(state, headers))]
pub async fn list<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<CustomerListResponse>, ApiError> {
    let deadline = state.deadline(&headers)?;
    let customers = state.customer_service.list_customers(deadline).await?;

    Ok(Json(CustomerListResponse {
        customers: customers.into_iter().map(Into::into).collect(),
    }))
}

/// GET /customers/{id}: load a customer with its children.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let deadline = state.deadline(&headers)?;
    let id = parse_customer_id(&id)?;
    let customer = state.customer_service.get_customer(deadline, id).await?;
    Ok(Json(customer.into()))
}

/// PATCH /customers/{id}: assign the supplied fields.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateCustomerRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let deadline = state.deadline(&headers)?;
    let id = parse_customer_id(&id)?;
    let patch = CustomerPatch {
        name: req.name,
        date_of_birth: req.date_of_birth,
    };
    let customer = state
        .customer_service
        .update_customer(deadline, id, patch)
        .await?;
    Ok(Json(customer.into()))
}

/// DELETE /customers/{id}: delete a customer and all of its children.
#[tracing::instrument(skip(state, headers))]
pub async fn delete<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let deadline = state.deadline(&headers)?;
    let id = parse_customer_id(&id)?;
    state.customer_service.delete_customer(deadline, id).await?;
    Ok(Json(SUCCESS))
}

/// GET /customers/by-email/{email}: load the customer owning an email.
#[tracing::instrument(skip(state, headers, email))]
pub async fn get_by_email<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let deadline = state.deadline(&headers)?;
    let customer = state
        .customer_service
        .get_customer_by_email(deadline, &email)
        .await?;
    Ok(Json(customer.into()))
}

/// GET /customers/by-phone-number/{phone_number}: load the customer owning a
/// phone number.
#[tracing::instrument(skip(state, headers, phone_number))]
pub async fn get_by_phone_number<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(phone_number): Path<String>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let deadline = state.deadline(&headers)?;
    let customer = state
        .customer_service
        .get_customer_by_phone_number(deadline, &phone_number)
        .await?;
    Ok(Json(customer.into()))
}

// -- Child collection handlers --

/// POST /customers/{id}/emails
pub async fn add_email<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AddEmailRequest>,
) -> Result<(StatusCode, Json<ChildCreatedResponse>), ApiError> {
    add_child(&state, &headers, ChildKind::Email, &id, &req.email).await
}

/// GET /customers/{id}/emails
pub async fn list_emails<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<EmailsResponse>, ApiError> {
    let emails = list_children(&state, &headers, ChildKind::Email, &id).await?;
    Ok(Json(EmailsResponse { emails }))
}

/// DELETE /customers/{id}/emails/{email}
pub async fn delete_email<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path((id, email)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    delete_child(&state, &headers, ChildKind::Email, &id, &email).await
}

/// POST /customers/{id}/phone-numbers
pub async fn add_phone_number<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AddPhoneNumberRequest>,
) -> Result<(StatusCode, Json<ChildCreatedResponse>), ApiError> {
    add_child(
        &state,
        &headers,
        ChildKind::PhoneNumber,
        &id,
        &req.phone_number,
    )
    .await
}

/// GET /customers/{id}/phone-numbers
pub async fn list_phone_numbers<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PhoneNumbersResponse>, ApiError> {
    let phone_numbers = list_children(&state, &headers, ChildKind::PhoneNumber, &id).await?;
    Ok(Json(PhoneNumbersResponse { phone_numbers }))
}

/// DELETE /customers/{id}/phone-numbers/{phone_number}
pub async fn delete_phone_number<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path((id, phone_number)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    delete_child(&state, &headers, ChildKind::PhoneNumber, &id, &phone_number).await
}

/// POST /customers/{id}/addresses
pub async fn add_address<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AddAddressRequest>,
) -> Result<(StatusCode, Json<ChildCreatedResponse>), ApiError> {
    add_child(&state, &headers, ChildKind::Address, &id, &req.address).await
}

/// GET /customers/{id}/addresses
pub async fn list_addresses<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AddressesResponse>, ApiError> {
    let addresses = list_children(&state, &headers, ChildKind::Address, &id).await?;
    Ok(Json(AddressesResponse { addresses }))
}

/// DELETE /customers/{id}/addresses/{address}
pub async fn delete_address<S: CustomerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path((id, address)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    delete_child(&state, &headers, ChildKind::Address, &id, &address).await
}

#[tracing::instrument(skip(state, headers, value))]
async fn add_child<S: CustomerStore>(
    state: &AppState<S>,
    headers: &HeaderMap,
    kind: ChildKind,
    id: &str,
    value: &str,
) -> Result<(StatusCode, Json<ChildCreatedResponse>), ApiError> {
    let deadline = state.deadline(headers)?;
    let id = parse_customer_id(id)?;
    let child = state
        .customer_service
        .add_child(deadline, kind, id, value)
        .await?;

    let response = ChildCreatedResponse {
        id: child.id.as_i64(),
        customer_id: child.customer_id.as_i64(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[tracing::instrument(skip(state, headers))]
async fn list_children<S: CustomerStore>(
    state: &AppState<S>,
    headers: &HeaderMap,
    kind: ChildKind,
    id: &str,
) -> Result<Vec<String>, ApiError> {
    let deadline = state.deadline(headers)?;
    let id = parse_customer_id(id)?;
    Ok(state
        .customer_service
        .list_children(deadline, kind, id)
        .await?)
}

#[tracing::instrument(skip(state, headers, value))]
async fn delete_child<S: CustomerStore>(
    state: &AppState<S>,
    headers: &HeaderMap,
    kind: ChildKind,
    id: &str,
    value: &str,
) -> Result<Json<SuccessResponse>, ApiError> {
    let deadline = state.deadline(headers)?;
    let id = parse_customer_id(id)?;
    state
        .customer_service
        .delete_child(deadline, kind, id, value)
        .await?;
    Ok(Json(SUCCESS))
}

// -- Helpers --

fn new_customer(name: String, date_of_birth: Option<String>) -> NewCustomer {
    NewCustomer {
        name,
        date_of_birth,
    }
}

fn parse_customer_id(id: &str) -> Result<CustomerId, ApiError> {
    id.parse::<i64>()
        .map(CustomerId::new)
        .map_err(|e| ApiError::BadRequest(format!("Invalid customer id {id:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use domain::InMemoryCustomerStore;

    fn state() -> AppState<InMemoryCustomerStore> {
        AppState {
            customer_service: CustomerService::new(InMemoryCustomerStore::new()),
            request_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_parse_customer_id() {
        assert_eq!(parse_customer_id("42").unwrap(), CustomerId::new(42));
        assert!(parse_customer_id("abc").is_err());
        assert!(parse_customer_id("").is_err());
    }

    #[tokio::test]
    async fn test_deadline_defaults_to_configured_timeout() {
        let state = state();
        let deadline = state.deadline(&HeaderMap::new()).unwrap();
        let remaining = deadline.remaining().unwrap();
        assert!(remaining > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_deadline_header_overrides_timeout() {
        let state = state();
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_TIMEOUT_HEADER, HeaderValue::from_static("50"));

        let deadline = state.deadline(&headers).unwrap();
        assert!(deadline.remaining().unwrap() <= Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_deadline_header_is_rejected() {
        let state = state();
        for value in ["0", "-1", "soon"] {
            let mut headers = HeaderMap::new();
            headers.insert(REQUEST_TIMEOUT_HEADER, HeaderValue::from_static(value));
            assert!(matches!(
                state.deadline(&headers),
                Err(ApiError::BadRequest(_))
            ));
        }
    }
}
