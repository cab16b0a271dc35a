use crate::notify::TracingNotifier;
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use futures_util::StreamExt;
use raillink_core::alerts::AlertKind;
use raillink_core::api::ReservationApi;
use raillink_core::search::TrainQuery;
use raillink_flow::{AlertCenter, SearchStage, SessionHandle};
use raillink_gateway::app_config::Config;
use raillink_gateway::{HttpApiClient, LiveFeed, LocalStore, SseFeedClient};
use raillink_shared::LiveEvent;
use raillink_tracking::{
    provider_from_config, GeoPoint, JourneyMonitor, JourneyView, RoutePath, StaticMapStyle,
    StationStop, TrainAnimator,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

fn api_client(config: &Config) -> Result<Arc<HttpApiClient>> {
    let client = HttpApiClient::new(&config.api).context("Could not build the API client")?;
    Ok(Arc::new(client))
}

pub async fn search(
    config: &Config,
    origin: &str,
    destination: &str,
    date: NaiveDate,
    passengers: u32,
) -> Result<()> {
    let api = api_client(config)?;
    let stage = SearchStage::new(
        api,
        SessionHandle::new(),
        Arc::new(TracingNotifier),
        Duration::from_secs(config.flow.login_wait_seconds),
    );
    let query = TrainQuery {
        origin: origin.to_string(),
        destination: destination.to_string(),
        date,
        passengers,
    };
    let offers = stage
        .search(&query)
        .await
        .map_err(|error| anyhow::anyhow!(error.user_message()))?;

    if offers.is_empty() {
        println!("No trains found from {} to {} on {}", origin, destination, date);
        return Ok(());
    }
    for view in &offers {
        println!(
            "{:>6}  {:<24} {} {} to {} {}  {}  INR {:.0}/passenger  total INR {:.0}  {} seats left",
            view.offer.id,
            view.offer.name,
            view.offer.origin,
            view.offer.departure,
            view.offer.destination,
            view.offer.arrival,
            view.offer.duration,
            view.offer.price,
            view.total_fare,
            view.offer.available_seats,
        );
    }
    Ok(())
}

pub async fn track(config: &Config, target: &str) -> Result<()> {
    let api = api_client(config)?;
    let store = Arc::new(LocalStore::open(&config.storage));

    // A PNR with a locally saved booking resolves to its train
    let train_id = match store.find_booking_by_pnr(target).await {
        Some(record) => {
            tracing::info!(
                "PNR {} resolves to {} (train {})",
                target,
                record.train_name,
                record.train_id
            );
            record.train_id
        }
        None => target
            .parse()
            .context("Pass a numeric train id or the PNR of a locally saved booking")?,
    };

    let snapshot = api
        .tracking_snapshot(train_id)
        .await
        .map_err(|error| anyhow::anyhow!(error.user_message("Tracking is unavailable")))?;

    let corridor = demo_corridor()?;
    let mut monitor = JourneyMonitor::new(
        train_id,
        corridor.stations.clone(),
        config.flow.tracking_tick_step,
    );
    monitor.seed(&snapshot);

    let style = StaticMapStyle {
        base_url: config.map.static_base_url.clone(),
        width: config.map.width,
        height: config.map.height,
    };
    let mut map = provider_from_config(&config.map.provider, style)?;
    let maps_key = api
        .maps_key()
        .await
        .map_err(|error| anyhow::anyhow!(error.user_message("Could not fetch the maps key")))?;
    map.init(&maps_key).await?;
    map.show_route(&corridor.route, &corridor.stops)?;

    let feed = SseFeedClient::new(&config.api, &config.stream)?;
    let events = feed.subscribe(train_id).await?;
    let alert_events = feed.subscribe(train_id).await?;

    let center = Arc::new(AlertCenter::new(
        api.clone(),
        store.clone(),
        Arc::new(TracingNotifier),
    ));
    let pump = tokio::spawn(alert_pump(alert_events, center));

    println!(
        "Tracking train {} from {:.1}% ({})",
        train_id, snapshot.progress, snapshot.status
    );
    for stop in &corridor.stations {
        println!(
            "  {:<20} arr {}  dep {}",
            stop.name,
            format_time(stop.scheduled_arrival),
            format_time(stop.scheduled_departure),
        );
    }

    let animator = TrainAnimator::start(
        monitor,
        events,
        Duration::from_secs(config.flow.tracking_tick_seconds),
    );
    let monitor = animator.monitor();
    let mut display = tokio::time::interval(Duration::from_secs(config.flow.tracking_tick_seconds));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = display.tick() => {
                let view = animator.view().await;
                let (eta, (position, heading)) = {
                    let guard = monitor.read().await;
                    (guard.eta(), guard.marker(&corridor.route))
                };
                map.update_position(position, heading)?;
                println!("{}", format_view(&view, eta));
                tracing::debug!("Map frame: {}", map.render_url()?);
            }
        }
    }

    pump.abort();
    println!("Stopped tracking train {}", train_id);
    Ok(())
}

pub async fn alerts(config: &Config) -> Result<()> {
    let api = api_client(config)?;
    let store = Arc::new(LocalStore::open(&config.storage));
    let center = AlertCenter::new(api, store, Arc::new(TracingNotifier));

    let subscriptions = match center.refresh().await {
        Ok(subscriptions) => subscriptions,
        Err(error) => {
            tracing::warn!("Using the cached subscription list: {}", error.user_message());
            center.subscriptions().await
        }
    };
    if subscriptions.is_empty() {
        println!("No alert subscriptions");
    } else {
        println!("Subscriptions:");
        for subscription in &subscriptions {
            let kinds: Vec<&str> = subscription
                .alert_types
                .iter()
                .map(|kind| kind.label())
                .collect();
            let contact = subscription
                .phone
                .as_deref()
                .or(subscription.email.as_deref())
                .unwrap_or("-");
            println!(
                "  {}  PNR {}  {}  [{}]",
                subscription.id,
                subscription.pnr,
                contact,
                kinds.join(", ")
            );
        }
    }

    let unread = center.unread_count().await;
    let history = center.history().await;
    println!("{} alerts ({} unread)", history.len(), unread);
    for alert in history.iter().rev() {
        let marker = if alert.read { ' ' } else { '*' };
        println!(
            "{} {} [{}] PNR {}: {}",
            marker,
            alert.created_at.format("%Y-%m-%d %H:%M"),
            alert.kind.label(),
            alert.pnr,
            alert.message
        );
    }
    if unread > 0 {
        center
            .mark_all_read()
            .await
            .map_err(|error| anyhow::anyhow!(error.user_message()))?;
    }
    Ok(())
}

pub async fn subscribe(config: &Config, pnr: &str, contact: &str, kinds: &[String]) -> Result<()> {
    let api = api_client(config)?;
    let store = Arc::new(LocalStore::open(&config.storage));
    let center = AlertCenter::new(api, store, Arc::new(TracingNotifier));

    let (phone, email) = if contact.contains('@') {
        (None, Some(contact))
    } else {
        (Some(contact), None)
    };
    let kinds = kinds
        .iter()
        .map(|raw| parse_kind(raw))
        .collect::<Result<BTreeSet<AlertKind>>>()?;

    let subscription = center
        .subscribe(pnr, phone, email, kinds)
        .await
        .map_err(|error| anyhow::anyhow!(error.user_message()))?;
    let kinds: Vec<&str> = subscription
        .alert_types
        .iter()
        .map(|kind| kind.label())
        .collect();
    println!(
        "Subscribed PNR {} as {} [{}]",
        subscription.pnr,
        subscription.id,
        kinds.join(", ")
    );
    Ok(())
}

pub async fn unsubscribe(config: &Config, id: &str) -> Result<()> {
    let api = api_client(config)?;
    let store = Arc::new(LocalStore::open(&config.storage));
    let center = AlertCenter::new(api, store, Arc::new(TracingNotifier));

    center
        .unsubscribe(id)
        .await
        .map_err(|error| anyhow::anyhow!(error.user_message()))?;
    println!("Removed subscription {}", id);
    Ok(())
}

async fn alert_pump(events: broadcast::Receiver<LiveEvent>, center: Arc<AlertCenter>) {
    let mut stream = BroadcastStream::new(events);
    while let Some(received) = stream.next().await {
        match received {
            Ok(event) => {
                if let Err(error) = center.handle_event(&event).await {
                    tracing::warn!("Alert handling failed: {}", error);
                }
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!("Alert feed lagged, {} events skipped", skipped);
            }
        }
    }
}

fn parse_kind(raw: &str) -> Result<AlertKind> {
    match raw {
        "delay" => Ok(AlertKind::Delay),
        "platform_change" => Ok(AlertKind::PlatformChange),
        "arrival" => Ok(AlertKind::Arrival),
        "route_deviation" => Ok(AlertKind::RouteDeviation),
        other => anyhow::bail!(
            "Unknown alert kind '{}' (expected delay, platform_change, arrival or route_deviation)",
            other
        ),
    }
}

fn format_time(time: Option<NaiveTime>) -> String {
    time.map(|time| time.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

fn format_view(view: &JourneyView, eta: Option<NaiveTime>) -> String {
    let mut parts = vec![format!("{:5.1}% {}", view.progress, view.status)];
    if let Some(station) = &view.current_station {
        parts.push(format!("at {}", station));
    }
    if let Some(station) = &view.next_station {
        parts.push(format!("next {}", station));
    }
    if let Some(delay) = view.delay_minutes.filter(|delay| *delay > 0) {
        parts.push(format!("delayed {} min", delay));
    }
    if let Some(eta) = eta {
        parts.push(format!("eta {}", eta.format("%H:%M")));
    }
    if !view.coach_positions.is_empty() {
        let coaches: Vec<String> = view
            .coach_positions
            .iter()
            .map(|coach| match coach.platform_number {
                Some(platform) => format!("{}@P{}", coach.coach_number, platform),
                None => coach.coach_number.clone(),
            })
            .collect();
        parts.push(format!("coaches {}", coaches.join(" ")));
    }
    parts.join(" | ")
}

struct Corridor {
    stations: Vec<StationStop>,
    stops: Vec<(String, GeoPoint)>,
    route: RoutePath,
}

// The backend has no route-geometry endpoint, so tracked journeys render on
// the built-in Delhi to Mumbai corridor.
fn demo_corridor() -> Result<Corridor> {
    let named: [(&str, f64, f64, Option<(u32, u32)>, Option<(u32, u32)>); 7] = [
        ("New Delhi", 28.6419, 77.2194, None, Some((16, 55))),
        ("Kota Junction", 25.1797, 75.8449, Some((23, 10)), Some((23, 15))),
        ("Ratlam Junction", 23.3315, 75.0403, Some((1, 47)), Some((1, 52))),
        ("Vadodara Junction", 22.3072, 73.1812, Some((4, 31)), Some((4, 41))),
        ("Surat", 21.2049, 72.8411, Some((6, 3)), Some((6, 8))),
        ("Borivali", 19.2307, 72.8567, Some((7, 44)), Some((7, 46))),
        ("Mumbai Central", 18.9696, 72.8193, Some((8, 15)), None),
    ];

    let mut stations = Vec::with_capacity(named.len());
    let mut stops = Vec::with_capacity(named.len());
    for (name, lat, lng, arrival, departure) in named {
        stations.push(StationStop {
            name: name.to_string(),
            scheduled_arrival: arrival.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            scheduled_departure: departure.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
        });
        stops.push((name.to_string(), GeoPoint::new(lat, lng)));
    }

    let mut points: Vec<GeoPoint> = stops.iter().map(|(_, point)| *point).collect();
    // The line bends through Sawai Madhopur between Delhi and Kota
    points.insert(1, GeoPoint::new(26.0173, 76.3454));
    let route = RoutePath::new(points)?;

    Ok(Corridor {
        stations,
        stops,
        route,
    })
}
