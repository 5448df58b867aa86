use super::fixture::{Fixture, Market};
use ahash::HashMap;
use std::fmt::{Display, Formatter};

pub const UNKNOWN_MARKET_TYPE: &str = "unknown";

/// Display names for one market and its selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketNames {
    pub name: String,
    pub market_type: String,
    pub selections: HashMap<String, String>,
}

/// Market/selection id -> display name lookup derived from one snapshot.
///
/// The index is immutable; a resync builds a new one and swaps it in.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    markets: HashMap<String, MarketNames>,
}

impl NameIndex {
    pub fn from_snapshot(snapshot: &Fixture) -> Self {
        let mut markets = HashMap::default();
        for market in &snapshot.markets {
            let selections = market
                .selections
                .iter()
                .map(|selection| (selection.id.clone(), selection.tag("name").unwrap_or_else(|| selection.id.clone())))
                .collect();
            let names = MarketNames {
                name: market.tag("name").unwrap_or_else(|| market.id.clone()),
                market_type: market.tag("type").unwrap_or_else(|| UNKNOWN_MARKET_TYPE.to_string()),
                selections,
            };
            markets.insert(market.id.clone(), names);
        }
        Self { markets }
    }

    pub fn get(&self, market_id: &str) -> Option<&MarketNames> {
        self.markets.get(market_id)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Resolve a delta market against the index. Ids the index does not know
    /// fall back to the raw identifiers.
    pub fn normalize(&self, market: &Market) -> MarketRecord {
        let names = self.markets.get(&market.id);
        let selections = market
            .selections
            .iter()
            .map(|selection| {
                names
                    .and_then(|n| n.selections.get(&selection.id))
                    .cloned()
                    .unwrap_or_else(|| selection.id.clone())
            })
            .collect();

        MarketRecord {
            market_type: names.map_or_else(|| UNKNOWN_MARKET_TYPE.to_string(), |n| n.market_type.clone()),
            name: names.map_or_else(|| market.id.clone(), |n| n.name.clone()),
            selections,
        }
    }

    /// Suspension records for every known market, ordered by market id.
    pub fn suspension_records(&self) -> Vec<String> {
        let mut ids: Vec<&String> = self.markets.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.markets.get(id))
            .map(|names| format!("SUSPENDED;{};{};", names.market_type, names.name))
            .collect()
    }
}

/// One normalized delta line: `type;name;selection;selection;...;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRecord {
    pub market_type: String,
    pub name: String,
    pub selections: Vec<String>,
}

impl Display for MarketRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{};{};", self.market_type, self.name)?;
        for selection in &self.selections {
            write!(f, "{};", selection)?;
        }
        Ok(())
    }
}
