//! Movie catalog endpoints, the resource behind the permission guards.
//!
//! # Endpoints
//!
//! - `GET /v1/movies` - list (`movies:read`)
//! - `POST /v1/movies` - create (`movies:write`)
//! - `GET /v1/movies/{id}` - show (`movies:read`)
//! - `PATCH /v1/movies/{id}` - partial update with version check (`movies:write`)
//! - `DELETE /v1/movies/{id}` - delete (`movies:write`)

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{info, instrument};

use super::util::ApiJson;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateMovieRequest, MessageResponse, MovieId, MovieResponse, MoviesResponse, NewMovie,
    UpdateMovieRequest,
};
use crate::state::AppState;
use crate::validation::{Validator, validate_movie};

fn movie_id(id: MovieId) -> AppResult<MovieId> {
    if id < 1 {
        return Err(AppError::NotFound(format!("movie {id}")));
    }
    Ok(id)
}

#[instrument(skip(state))]
pub async fn list_movies(State(state): State<AppState>) -> AppResult<Json<MoviesResponse>> {
    let movies = state.stores.movies.list().await?;
    Ok(Json(MoviesResponse { movies }))
}

#[instrument(skip(state, payload))]
pub async fn create_movie(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateMovieRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<MovieResponse>)> {
    let mut v = Validator::new();
    validate_movie(
        &mut v,
        &payload.title,
        payload.year,
        payload.runtime,
        &payload.genres,
    );
    v.finish()?;

    let movie = state
        .stores
        .movies
        .insert(NewMovie {
            title: payload.title,
            year: payload.year,
            runtime: payload.runtime,
            genres: payload.genres,
        })
        .await?;

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .map_err(|e| AppError::Internal(e.to_string()))?;
    headers.insert(LOCATION, location);

    info!(movie_id = movie.id, "Movie created");
    Ok((StatusCode::CREATED, headers, Json(MovieResponse { movie })))
}

#[instrument(skip(state))]
pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<MovieId>,
) -> AppResult<Json<MovieResponse>> {
    let movie = state.stores.movies.get(movie_id(id)?).await?;
    Ok(Json(MovieResponse { movie }))
}

/// Apply a partial update. A concurrent edit between read and write is a `409`.
#[instrument(skip(state, payload))]
pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<MovieId>,
    ApiJson(payload): ApiJson<UpdateMovieRequest>,
) -> AppResult<Json<MovieResponse>> {
    let mut movie = state.stores.movies.get(movie_id(id)?).await?;

    if let Some(title) = payload.title {
        movie.title = title;
    }
    if let Some(year) = payload.year {
        movie.year = year;
    }
    if let Some(runtime) = payload.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = payload.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie.title, movie.year, movie.runtime, &movie.genres);
    v.finish()?;

    let movie = state.stores.movies.update(movie).await?;
    Ok(Json(MovieResponse { movie }))
}

#[instrument(skip(state))]
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<MovieId>,
) -> AppResult<Json<MessageResponse>> {
    state.stores.movies.delete(movie_id(id)?).await?;
    info!(movie_id = id, "Movie deleted");
    Ok(Json(MessageResponse::new("movie successfully deleted")))
}
