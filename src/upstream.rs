//! Upstream hotel API abstraction.
//!
//! [`HotelsApi`] is an authenticated handle able to call the remote service;
//! [`ClientFactory`] produces new handles from fixed credentials. How a real
//! handle obtains and refreshes tokens, and which transport it speaks, is the
//! implementor's concern.
//!
//! [`StaticHotelsApi`] answers from an in-memory directory. It is meant for
//! tests and local runs, and can inject latency and failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    Distance, Hotel, HotelOffers, HotelOffersRequest, HotelOffersResponse, HotelsListRequest,
    HotelsListResponse, RadiusUnit,
};

/// Coordinates used by the default health check (central Madrid).
const HEALTH_LATITUDE: f64 = 40.41436995;
const HEALTH_LONGITUDE: f64 = -3.69170868;

/// Authenticated handle to the upstream hotel API.
///
/// All methods use `&self`; a handle is borrowed from the pool for one call.
#[allow(async_fn_in_trait)]
pub trait HotelsApi: Send + Sync {
    /// Hotels within a radius of a point.
    ///
    /// # Errors
    /// Returns `Err` if the upstream rejects the request or cannot be reached.
    async fn hotels_by_geocode(&self, request: &HotelsListRequest) -> Result<HotelsListResponse>;

    /// Offers for a set of hotels and stay dates.
    ///
    /// # Errors
    /// Returns `Err` if the upstream rejects the request or cannot be reached.
    async fn hotel_offers(&self, request: &HotelOffersRequest) -> Result<HotelOffersResponse>;

    /// Verify the upstream is reachable with a minimal search.
    ///
    /// # Errors
    /// Returns `Err` if the search fails.
    async fn health_check(&self) -> Result<bool> {
        let request = HotelsListRequest::new(HEALTH_LATITUDE, HEALTH_LONGITUDE)
            .with_radius(1, RadiusUnit::Km);
        self.hotels_by_geocode(&request).await.map(|_| true)
    }
}

/// Produces new upstream handles on demand.
///
/// Construction is expected to be cheap relative to a network call; the pool
/// creates overflow handles rather than making callers wait.
pub trait ClientFactory: Send + Sync {
    type Client: HotelsApi;

    fn create(&self) -> Self::Client;
}

#[derive(Default)]
struct Directory {
    hotels: Vec<Hotel>,
    offers: HashMap<String, HotelOffers>,
    failing_locations: Vec<(f64, f64)>,
    failing_hotels: HashSet<String>,
}

/// In-memory upstream used by tests and local runs.
///
/// Clones share the same directory and counters.
#[derive(Clone, Default)]
pub struct StaticHotelsApi {
    directory: Arc<RwLock<Directory>>,
    latency: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl StaticHotelsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add_hotel(&self, hotel: Hotel) {
        self.write().hotels.push(hotel);
    }

    pub fn add_offers(&self, offers: HotelOffers) {
        self.write()
            .offers
            .insert(offers.hotel.hotel_id.clone(), offers);
    }

    /// Make searches centred exactly on this point fail with a 500.
    pub fn fail_location(&self, latitude: f64, longitude: f64) {
        self.write().failing_locations.push((latitude, longitude));
    }

    /// Make offer searches including this hotel fail with a 500.
    pub fn fail_hotel(&self, hotel_id: &str) {
        self.write().failing_hotels.insert(hotel_id.to_string());
    }

    /// Total upstream calls served, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Directory> {
        self.directory.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Directory> {
        self.directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self) -> CallScope<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let scope = CallScope {
            in_flight: &self.in_flight,
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        scope
    }
}

struct CallScope<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn server_error(message: String) -> Error {
    Error::Upstream {
        message,
        status_code: Some(500),
        error_code: Some(141),
    }
}

/// Great-circle distance in kilometres.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

impl HotelsApi for StaticHotelsApi {
    async fn hotels_by_geocode(&self, request: &HotelsListRequest) -> Result<HotelsListResponse> {
        let _scope = self.enter().await;
        let directory = self.read();

        if directory
            .failing_locations
            .iter()
            .any(|(lat, lon)| *lat == request.latitude && *lon == request.longitude)
        {
            return Err(server_error(format!(
                "hotel list unavailable at {},{}",
                request.latitude, request.longitude
            )));
        }

        let (unit_label, per_km) = match request.radius_unit {
            RadiusUnit::Km => ("KM", 1.0),
            RadiusUnit::Mile => ("MILE", 0.621371),
        };

        let mut found: Vec<Hotel> = directory
            .hotels
            .iter()
            .filter_map(|hotel| {
                let km = haversine_km(
                    request.latitude,
                    request.longitude,
                    hotel.geo_code.latitude,
                    hotel.geo_code.longitude,
                );
                let distance = km * per_km;
                if distance > f64::from(request.radius) {
                    return None;
                }
                if let Some(chains) = &request.chain_codes {
                    if !hotel
                        .chain_code
                        .as_ref()
                        .is_some_and(|code| chains.contains(code))
                    {
                        return None;
                    }
                }
                let mut hotel = hotel.clone();
                hotel.distance = Some(Distance {
                    value: (distance * 100.0).round() / 100.0,
                    unit: unit_label.to_string(),
                });
                Some(hotel)
            })
            .collect();

        found.sort_by(|a, b| {
            let da = a.distance.as_ref().map_or(0.0, |d| d.value);
            let db = b.distance.as_ref().map_or(0.0, |d| d.value);
            da.total_cmp(&db)
        });

        Ok(HotelsListResponse {
            data: found,
            meta: Default::default(),
        })
    }

    async fn hotel_offers(&self, request: &HotelOffersRequest) -> Result<HotelOffersResponse> {
        let _scope = self.enter().await;
        let directory = self.read();

        if let Some(id) = request
            .hotel_ids
            .iter()
            .find(|id| directory.failing_hotels.contains(*id))
        {
            return Err(server_error(format!("offers unavailable for {}", id)));
        }

        let data = request
            .hotel_ids
            .iter()
            .filter_map(|id| directory.offers.get(id))
            .map(|offers| {
                let mut offers = offers.clone();
                offers.offers.retain(|offer| {
                    offer.check_in_date == request.check_in_date
                        && offer.check_out_date == request.check_out_date
                        && offer.adults == request.adults
                });
                offers.available = !offers.offers.is_empty();
                offers
            })
            .filter(|offers| request.include_closed || offers.available)
            .collect();

        Ok(HotelOffersResponse { data })
    }
}

/// Factory handing out [`StaticHotelsApi`] handles that share one directory.
#[derive(Clone, Default)]
pub struct StaticClientFactory {
    api: StaticHotelsApi,
    created: Arc<AtomicUsize>,
}

impl StaticClientFactory {
    pub fn new(api: StaticHotelsApi) -> Self {
        StaticClientFactory {
            api,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handles constructed so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn api(&self) -> &StaticHotelsApi {
        &self.api
    }
}

impl ClientFactory for StaticClientFactory {
    type Client = StaticHotelsApi;

    fn create(&self) -> StaticHotelsApi {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.api.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoCode, HotelOffer, OfferedHotel, Price, Room};

    fn hotel(id: &str, chain: &str, latitude: f64, longitude: f64) -> Hotel {
        Hotel {
            chain_code: Some(chain.to_string()),
            iata_code: None,
            dupe_id: None,
            name: format!("Hotel {}", id),
            hotel_id: id.to_string(),
            geo_code: GeoCode {
                latitude,
                longitude,
            },
            address: None,
            distance: None,
        }
    }

    #[tokio::test]
    async fn test_geocode_search_filters_by_radius_and_sorts() {
        let api = StaticHotelsApi::new();
        api.add_hotel(hotel("FAR", "HL", 48.95, 2.35));
        api.add_hotel(hotel("NEAR", "HL", 48.857, 2.352));
        api.add_hotel(hotel("MID", "MC", 48.87, 2.35));

        let response = api
            .hotels_by_geocode(&HotelsListRequest::new(48.8566, 2.3522))
            .await
            .unwrap();

        let ids: Vec<&str> = response.data.iter().map(|h| h.hotel_id.as_str()).collect();
        assert_eq!(ids, vec!["NEAR", "MID"]);
        assert_eq!(response.data[0].distance.as_ref().unwrap().unit, "KM");
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_location() {
        let api = StaticHotelsApi::new();
        api.fail_location(10.0, 10.0);

        let result = api
            .hotels_by_geocode(&HotelsListRequest::new(10.0, 10.0))
            .await;
        assert!(matches!(
            result,
            Err(Error::Upstream {
                status_code: Some(500),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_offers_match_dates_and_guests() {
        let api = StaticHotelsApi::new();
        api.add_offers(HotelOffers {
            hotel: OfferedHotel {
                hotel_id: "MCLONGHM".to_string(),
                name: "JW Marriott Grosvenor House".to_string(),
                chain_code: Some("MC".to_string()),
                city_code: Some("LON".to_string()),
                latitude: None,
                longitude: None,
            },
            available: true,
            offers: vec![HotelOffer {
                id: "OF1".to_string(),
                check_in_date: "2026-11-01".to_string(),
                check_out_date: "2026-11-03".to_string(),
                rate_code: None,
                room: Room {
                    room_type: "A1K".to_string(),
                    description: None,
                },
                adults: 1,
                price: Price {
                    currency: "GBP".to_string(),
                    base: None,
                    total: "420.00".to_string(),
                },
            }],
        });

        let matching =
            HotelOffersRequest::new(vec!["MCLONGHM".to_string()], "2026-11-01", "2026-11-03");
        let response = api.hotel_offers(&matching).await.unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].offers[0].id, "OF1");

        let other_dates =
            HotelOffersRequest::new(vec!["MCLONGHM".to_string()], "2026-12-01", "2026-12-03");
        assert!(api.hotel_offers(&other_dates).await.unwrap().data.is_empty());
    }

    #[tokio::test]
    async fn test_health_check_default() {
        let api = StaticHotelsApi::new();
        assert!(api.health_check().await.unwrap());

        api.fail_location(HEALTH_LATITUDE, HEALTH_LONGITUDE);
        assert!(api.health_check().await.is_err());
    }

    #[test]
    fn test_factory_shares_directory() {
        let factory = StaticClientFactory::new(StaticHotelsApi::new());
        let a = factory.create();
        let b = factory.create();
        a.add_hotel(hotel("X", "HL", 0.0, 0.0));

        assert_eq!(b.read().hotels.len(), 1);
        assert_eq!(factory.created(), 2);
    }
}
