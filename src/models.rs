//! Request and response shapes for the hotel search operations.
//!
//! Field names follow the upstream JSON (camelCase) through serde renames, so
//! the same types decode upstream documents and are stored in the response
//! cache. Responses implement `Default` as the well-formed empty result that
//! replaces a failed slot in a batch.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::{normalize_list, Fingerprint};

/// Geographic coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCode {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "countryCode", default)]
    pub country_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub value: f64,
    pub unit: String,
}

/// A hotel returned by the hotel list search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    #[serde(rename = "chainCode", default)]
    pub chain_code: Option<String>,
    #[serde(rename = "iataCode", default)]
    pub iata_code: Option<String>,
    #[serde(rename = "dupeId", default)]
    pub dupe_id: Option<i64>,
    pub name: String,
    #[serde(rename = "hotelId")]
    pub hotel_id: String,
    #[serde(rename = "geoCode")]
    pub geo_code: GeoCode,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub distance: Option<Distance>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiusUnit {
    #[default]
    #[serde(rename = "KM")]
    Km,
    #[serde(rename = "MILE")]
    Mile,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HotelSource {
    #[serde(rename = "BEDBANK")]
    Bedbank,
    #[serde(rename = "DIRECTCHAIN")]
    DirectChain,
    #[default]
    #[serde(rename = "ALL")]
    All,
}

/// Search for hotels around a point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelsListRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: u32,
    pub radius_unit: RadiusUnit,
    pub chain_codes: Option<Vec<String>>,
    pub amenities: Option<Vec<String>>,
    pub ratings: Option<Vec<u8>>,
    pub hotel_source: HotelSource,
}

impl HotelsListRequest {
    /// Search within 5 km of a point, all sources, no filters.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        HotelsListRequest {
            latitude,
            longitude,
            radius: 5,
            radius_unit: RadiusUnit::Km,
            chain_codes: None,
            amenities: None,
            ratings: None,
            hotel_source: HotelSource::All,
        }
    }

    pub fn with_radius(mut self, radius: u32, unit: RadiusUnit) -> Self {
        self.radius = radius;
        self.radius_unit = unit;
        self
    }

    pub fn with_amenities(mut self, amenities: Vec<String>) -> Self {
        self.amenities = Some(amenities);
        self
    }

    pub fn with_ratings(mut self, ratings: Vec<u8>) -> Self {
        self.ratings = Some(ratings);
        self
    }

    /// # Errors
    ///
    /// Returns `Error::ValidationError` for out-of-range coordinates, a zero
    /// radius or a star rating outside 1-5.
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::ValidationError(
                "Latitude must be between -90 and 90 degrees".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::ValidationError(
                "Longitude must be between -180 and 180 degrees".to_string(),
            ));
        }
        if self.radius == 0 {
            return Err(Error::ValidationError("Radius must be positive".to_string()));
        }
        if let Some(ratings) = &self.ratings {
            if let Some(bad) = ratings.iter().find(|r| !(1..=5).contains(*r)) {
                return Err(Error::ValidationError(format!(
                    "Rating {} must be between 1 and 5",
                    bad
                )));
            }
        }
        Ok(())
    }
}

impl Fingerprint for HotelsListRequest {
    fn normalized(&self) -> Cow<'_, Self> {
        let mut canonical = self.clone();
        // -0.0 and 0.0 are the same point
        if canonical.latitude == 0.0 {
            canonical.latitude = 0.0;
        }
        if canonical.longitude == 0.0 {
            canonical.longitude = 0.0;
        }
        normalize_list(&mut canonical.chain_codes);
        normalize_list(&mut canonical.amenities);
        normalize_list(&mut canonical.ratings);
        Cow::Owned(canonical)
    }
}

/// Hotels near a search point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HotelsListResponse {
    pub data: Vec<Hotel>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// Search for offers at specific hotels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelOffersRequest {
    pub hotel_ids: Vec<String>,
    pub adults: u8,
    /// ISO date, `YYYY-MM-DD`.
    pub check_in_date: String,
    /// ISO date, `YYYY-MM-DD`.
    pub check_out_date: String,
    pub room_quantity: u8,
    pub currency: Option<String>,
    pub price_range: Option<String>,
    pub payment_policy: String,
    pub board_type: Option<String>,
    pub include_closed: bool,
    pub best_rate_only: bool,
    pub lang: Option<String>,
}

const PAYMENT_POLICIES: [&str; 3] = ["GUARANTEE", "DEPOSIT", "NONE"];
const BOARD_TYPES: [&str; 5] = [
    "ROOM_ONLY",
    "BREAKFAST",
    "HALF_BOARD",
    "FULL_BOARD",
    "ALL_INCLUSIVE",
];

impl HotelOffersRequest {
    /// One adult, one room, best rate only.
    pub fn new(hotel_ids: Vec<String>, check_in_date: &str, check_out_date: &str) -> Self {
        HotelOffersRequest {
            hotel_ids,
            adults: 1,
            check_in_date: check_in_date.to_string(),
            check_out_date: check_out_date.to_string(),
            room_quantity: 1,
            currency: None,
            price_range: None,
            payment_policy: "NONE".to_string(),
            board_type: None,
            include_closed: false,
            best_rate_only: true,
            lang: None,
        }
    }

    pub fn with_adults(mut self, adults: u8) -> Self {
        self.adults = adults;
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_string());
        self
    }

    /// # Errors
    ///
    /// Returns `Error::ValidationError` when no hotel id is given, guest or
    /// room counts fall outside 1-9, dates are not ISO `YYYY-MM-DD`, check-out
    /// is not after check-in, or a policy/board filter is unknown.
    pub fn validate(&self) -> Result<()> {
        if self.hotel_ids.is_empty() {
            return Err(Error::ValidationError(
                "At least one hotel id is required".to_string(),
            ));
        }
        if !(1..=9).contains(&self.adults) {
            return Err(Error::ValidationError(
                "Adults must be between 1 and 9".to_string(),
            ));
        }
        if !(1..=9).contains(&self.room_quantity) {
            return Err(Error::ValidationError(
                "Room quantity must be between 1 and 9".to_string(),
            ));
        }
        for date in [&self.check_in_date, &self.check_out_date] {
            if !is_iso_date(date) {
                return Err(Error::ValidationError(format!(
                    "Date '{}' must use YYYY-MM-DD",
                    date
                )));
            }
        }
        // Fixed-width ISO dates order lexically
        if self.check_out_date <= self.check_in_date {
            return Err(Error::ValidationError(
                "check_out_date must be after check_in_date".to_string(),
            ));
        }
        if !PAYMENT_POLICIES.contains(&self.payment_policy.as_str()) {
            return Err(Error::ValidationError(format!(
                "payment_policy must be one of {:?}",
                PAYMENT_POLICIES
            )));
        }
        if let Some(board) = &self.board_type {
            if !BOARD_TYPES.contains(&board.as_str()) {
                return Err(Error::ValidationError(format!(
                    "board_type must be one of {:?}",
                    BOARD_TYPES
                )));
            }
        }
        Ok(())
    }
}

fn is_iso_date(date: &str) -> bool {
    let bytes = date.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

// Hotel ids decide the order and multiplicity of the response, so they are
// hashed as given.
impl Fingerprint for HotelOffersRequest {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub currency: String,
    #[serde(default)]
    pub base: Option<String>,
    pub total: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "type")]
    pub room_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A single bookable offer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelOffer {
    pub id: String,
    #[serde(rename = "checkInDate")]
    pub check_in_date: String,
    #[serde(rename = "checkOutDate")]
    pub check_out_date: String,
    #[serde(rename = "rateCode", default)]
    pub rate_code: Option<String>,
    pub room: Room,
    pub adults: u8,
    pub price: Price,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferedHotel {
    #[serde(rename = "hotelId")]
    pub hotel_id: String,
    pub name: String,
    #[serde(rename = "chainCode", default)]
    pub chain_code: Option<String>,
    #[serde(rename = "cityCode", default)]
    pub city_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Offers for one hotel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelOffers {
    pub hotel: OfferedHotel,
    pub available: bool,
    pub offers: Vec<HotelOffer>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HotelOffersResponse {
    pub data: Vec<HotelOffers>,
}

/// A point for multi-location searches.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Filters shared by every location of a multi-location search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSearch {
    pub radius: u32,
    pub radius_unit: RadiusUnit,
    pub chain_codes: Option<Vec<String>>,
    pub amenities: Option<Vec<String>>,
    pub ratings: Option<Vec<u8>>,
    pub hotel_source: HotelSource,
}

impl Default for LocationSearch {
    fn default() -> Self {
        LocationSearch {
            radius: 5,
            radius_unit: RadiusUnit::Km,
            chain_codes: None,
            amenities: None,
            ratings: None,
            hotel_source: HotelSource::All,
        }
    }
}

impl LocationSearch {
    /// Expand into one request per location, in location order.
    pub fn requests_for(&self, locations: &[Location]) -> Vec<HotelsListRequest> {
        locations
            .iter()
            .map(|location| HotelsListRequest {
                latitude: location.latitude,
                longitude: location.longitude,
                radius: self.radius,
                radius_unit: self.radius_unit,
                chain_codes: self.chain_codes.clone(),
                amenities: self.amenities.clone(),
                ratings: self.ratings.clone(),
                hotel_source: self.hotel_source,
            })
            .collect()
    }
}
