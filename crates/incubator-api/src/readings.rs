use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use incubator_db::ReadingFilter;
use incubator_types::api::{ReadingsQuery, ReadingsResponse};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::middleware::AuthenticatedUser;

const MAX_LIMIT: u32 = 10_000;

/// Readings for every device the caller owns, oldest first.
pub async fn get_readings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ReadingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = to_filter(&query)?;

    let readings = blocking(move || -> Result<_, ApiError> {
        let serials: Vec<String> = state
            .credentials
            .devices(&user.username)?
            .into_iter()
            .map(|d| d.serial_number)
            .collect();
        Ok(state.db.readings_for_serials(&serials, &filter)?)
    })
    .await??;

    Ok(Json(ReadingsResponse {
        total: readings.len(),
        readings,
    }))
}

fn to_filter(query: &ReadingsQuery) -> Result<ReadingFilter, ApiError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::BadRequest("`from` is after `to`".into()));
        }
    }

    let hours = match (query.hour_from, query.hour_to) {
        (None, None) => None,
        (start, end) => {
            let (start, end) = (start.unwrap_or(0), end.unwrap_or(23));
            if start > 23 || end > 23 || start > end {
                return Err(ApiError::BadRequest(format!(
                    "invalid hour window {}-{}",
                    start, end
                )));
            }
            Some((start, end))
        }
    };

    Ok(ReadingFilter {
        from: query.from,
        to: query.to,
        hours,
        limit: query.limit.map(|l| l.min(MAX_LIMIT)),
    })
}
