//! Argument schemas for the travel tools the assistant knows about.
//!
//! The turn loop never enforces these; they only tell the model how to
//! shape its calls.

use serde_json::{json, Value};

use wf_domain::tool::ToolDefinition;

fn def(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

/// `{city, <kind>, count}` search with a default result count.
fn city_search(name: &str, description: &str, kind: &str, count: u32) -> ToolDefinition {
    def(
        name,
        description,
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                kind: { "type": "string" },
                "count": { "type": "number", "default": count }
            },
            "required": ["city", kind],
            "additionalProperties": false
        }),
    )
}

/// Every travel tool definition, in a stable order.
pub fn travel_catalog() -> Vec<ToolDefinition> {
    vec![
        def(
            "calculate_distance",
            "Calculate distances and durations between multiple locations in a route",
            json!({
                "type": "object",
                "properties": {
                    "route": {
                        "type": "array",
                        "description": "Route segments with origin and destination points",
                        "items": {
                            "type": "object",
                            "properties": {
                                "origin": { "type": "string", "description": "Starting location (address, landmark, or coordinates)" },
                                "destination": { "type": "string", "description": "Ending location (address, landmark, or coordinates)" }
                            },
                            "required": ["origin", "destination"]
                        }
                    },
                    "mode": {
                        "type": "string",
                        "description": "Travel mode for the route calculation",
                        "enum": ["driving", "walking", "bicycling", "transit"],
                        "default": "driving"
                    },
                    "returnTotals": {
                        "type": "boolean",
                        "description": "Return only total distance/duration instead of per-segment details"
                    }
                },
                "required": ["route"],
                "additionalProperties": false
            }),
        ),
        def(
            "find_hotels",
            "Find available hotels in a city",
            json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string" },
                    "stars": { "type": "number" },
                    "nearCBD": { "type": "boolean" }
                },
                "required": ["city", "stars", "nearCBD"],
                "additionalProperties": false
            }),
        ),
        def(
            "find_top_rated_hotels",
            "Find top-rated hotels in a city based on minimum star rating",
            json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "City and country, e.g. 'Bali, Indonesia'" },
                    "stars": { "type": "number", "description": "Minimum number of stars" },
                    "count": { "type": "number", "description": "Number of hotels to find", "default": 3 }
                },
                "required": ["city", "stars"],
                "additionalProperties": false
            }),
        ),
        def(
            "find_car_rentals",
            "Identify available vehicle rental services within a city",
            json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string" },
                    "count": { "type": "number" }
                },
                "required": ["city", "count"],
                "additionalProperties": false
            }),
        ),
        def(
            "search_flights",
            "Search available flights between two airports for given dates",
            json!({
                "type": "object",
                "properties": {
                    "origin": { "type": "string", "description": "Departure airport code, e.g. 'CGK'" },
                    "destination": { "type": "string", "description": "Arrival airport code, e.g. 'DPS'" },
                    "departDate": { "type": "string", "description": "Departure date, YYYY-MM-DD" },
                    "returnDate": { "type": "string", "description": "Return date, YYYY-MM-DD (optional)" }
                },
                "required": ["origin", "destination", "departDate"],
                "additionalProperties": false
            }),
        ),
        city_search("find_restaurants", "Find restaurants of a specific cuisine in a city", "cuisine", 3),
        city_search("find_top_rated_restaurants", "Find top-rated restaurants of a specific cuisine in a city", "cuisine", 3),
        city_search("find_nightlife", "Find nightlife venues in a city", "type", 3),
        city_search("find_meeting_venues", "Find meeting venues in a city", "type", 3),
        city_search("find_top_rated_meeting_venues", "Find top-rated meeting venues in a city", "type", 3),
        def(
            "find_top_rated_attractions",
            "Find top-rated tourist attractions in a city",
            json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string" },
                    "count": { "type": "number", "default": 5 }
                },
                "required": ["city"],
                "additionalProperties": false
            }),
        ),
        def(
            "find_travel_destinations",
            "Find places worth visiting in a city",
            json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string" },
                    "count": { "type": "number", "default": 5 }
                },
                "required": ["city"],
                "additionalProperties": false
            }),
        ),
        def(
            "get_weather",
            "Get weather information for a specific city",
            json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "The name of the city" }
                },
                "required": ["city"],
                "additionalProperties": false
            }),
        ),
    ]
}

/// Look up one catalogue entry by tool name.
pub fn definition(name: &str) -> Option<ToolDefinition> {
    travel_catalog().into_iter().find(|d| d.name == name)
}
