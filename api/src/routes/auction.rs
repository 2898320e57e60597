use actix_identity::Identity;
use actix_web::{HttpResponse, get, post, web};
use engine::Engine;
use payloads::requests::{
    ContinueAuction, CreateAuction, FinalCall, GetBidHistory, GetSnapshot, PlaceBid,
    Skip, StartAuction, StopAuction, Undo, Vote,
};
use payloads::AuctionId;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::routes::{APIError, get_manager_id};

/// Note: the identity-derived manager id always wins over whatever the
/// caller put in the body's admin/bidder/voter field, so a client can't
/// spoof another manager's identity by editing the JSON payload.

#[tracing::instrument(skip(user, engine), ret)]
#[post("/create_auction")]
pub async fn create_auction(
    user: Identity,
    mut details: web::Json<CreateAuction>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    details.admin_id = get_manager_id(&user)?;
    let auction_id = engine.create_auction(details.into_inner()).await?;
    Ok(HttpResponse::Ok().json(auction_id))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/start_auction")]
pub async fn start_auction(
    user: Identity,
    req: web::Json<StartAuction>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let admin_id = get_manager_id(&user)?;
    let snapshot = engine.start(req.auction_id, admin_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/stop_auction")]
pub async fn stop_auction(
    user: Identity,
    req: web::Json<StopAuction>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let admin_id = get_manager_id(&user)?;
    let snapshot = engine.stop(req.auction_id, admin_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/continue_auction")]
pub async fn continue_auction(
    user: Identity,
    req: web::Json<ContinueAuction>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let admin_id = get_manager_id(&user)?;
    let snapshot = engine.continue_auction(req.auction_id, admin_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/final_call")]
pub async fn final_call(
    user: Identity,
    req: web::Json<FinalCall>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let admin_id = get_manager_id(&user)?;
    let snapshot = engine.final_call(req.auction_id, admin_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/skip")]
pub async fn skip(
    user: Identity,
    req: web::Json<Skip>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let admin_id = get_manager_id(&user)?;
    let snapshot = engine.skip(req.auction_id, admin_id, req.player_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/undo")]
pub async fn undo(
    user: Identity,
    req: web::Json<Undo>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let admin_id = get_manager_id(&user)?;
    let snapshot = engine.undo(req.auction_id, admin_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/place_bid")]
pub async fn place_bid(
    user: Identity,
    req: web::Json<PlaceBid>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let bidder_id = get_manager_id(&user)?;
    let snapshot = engine
        .place_bid(req.auction_id, bidder_id, req.player_id, req.amount, req.client_bid_id)
        .await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/vote")]
pub async fn vote(
    user: Identity,
    req: web::Json<Vote>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let voter_id = get_manager_id(&user)?;
    let snapshot = engine.vote(req.auction_id, voter_id, req.player_id, req.value).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/snapshot")]
pub async fn get_snapshot(
    user: Identity,
    req: web::Json<GetSnapshot>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let _ = get_manager_id(&user)?;
    let snapshot = engine.snapshot(req.auction_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[tracing::instrument(skip(user, engine), ret)]
#[post("/bid_history")]
pub async fn get_bid_history(
    user: Identity,
    req: web::Json<GetBidHistory>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let _ = get_manager_id(&user)?;
    let history = engine
        .bid_history(req.auction_id, req.player_id, req.include_invalid)
        .await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Server-sent event stream of an auction's broadcast events. The first
/// frame is always a `Resync` snapshot addressed to this subscriber alone,
/// so a freshly connected client never has to round-trip for its starting
/// state before the live events make sense.
#[tracing::instrument(skip(user, engine))]
#[get("/subscribe/{auction_id}")]
pub async fn subscribe(
    user: Identity,
    path: web::Path<AuctionId>,
    engine: web::Data<Engine>,
) -> Result<HttpResponse, APIError> {
    let _ = get_manager_id(&user)?;
    let auction_id = path.into_inner();
    let (resync, rx) = engine.subscribe(auction_id).await?;

    // A lagged subscriber has already missed events it can't recover out of
    // the buffer; end the stream here rather than silently skip ahead, so
    // the client's `EventSource` reconnects and gets a fresh `Resync`.
    let live = BroadcastStream::new(rx)
        .take_while(|item| std::future::ready(item.is_ok()))
        .filter_map(|event| event.ok());
    let frames = tokio_stream::once(resync).chain(live).map(|event| {
        let line = serde_json::to_string(&event)
            .map(|json| format!("data: {json}\n\n"))
            .unwrap_or_default();
        Ok::<_, actix_web::Error>(web::Bytes::from(line))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .streaming(frames))
}
