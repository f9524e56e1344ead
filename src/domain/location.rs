use serde::{Deserialize, Serialize};

/// One row of the location reference file. Higher-level entries leave
/// the finer-grained fields null (a county entry has no city, a state
/// entry has neither).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationEntry {
    pub state: Option<String>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
}

impl LocationEntry {
    pub fn is_neighborhood(&self) -> bool {
        self.neighborhood.is_some()
    }

    pub fn is_city(&self) -> bool {
        self.city.is_some() && self.neighborhood.is_none()
    }
}
