use std::{fmt, num::NonZeroU32, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::{InstanceState, ProcessInstance, UnknownInstanceState, UserProfile};

/// The backend wraps most payloads in `{"data": ...}`; the engine's own
/// search endpoint does not.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    BpmnProcessId,
    StartDate,
    EndDate,
    ProcessDefinitionKey,
    ParentProcessInstanceKey,
    State,
}

impl FilterField {
    pub const ALL: [FilterField; 6] = [
        FilterField::BpmnProcessId,
        FilterField::StartDate,
        FilterField::EndDate,
        FilterField::ProcessDefinitionKey,
        FilterField::ParentProcessInstanceKey,
        FilterField::State,
    ];

    pub fn query_name(&self) -> &'static str {
        match self {
            Self::BpmnProcessId => "bpmnProcessId",
            Self::StartDate => "startDate",
            Self::EndDate => "endDate",
            Self::ProcessDefinitionKey => "processDefinitionKey",
            Self::ParentProcessInstanceKey => "parentProcessInstanceKey",
            Self::State => "state",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("unknown filter field '{0}'")]
    UnknownField(String),
    #[error(transparent)]
    State(#[from] UnknownInstanceState),
}

impl FromStr for FilterField {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.query_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FilterError::UnknownField(s.to_string()))
    }
}

/// Search filter for process instances. Every field is optional; blank
/// values are treated as absent and never reach the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub bpmn_process_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub process_definition_key: Option<String>,
    pub parent_process_instance_key: Option<String>,
    pub state: Option<InstanceState>,
}

impl ResourceFilter {
    pub fn with_state(state: InstanceState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Sets a single field from form-style text input. An empty value clears
    /// the field.
    pub fn set(&mut self, field: FilterField, value: &str) -> Result<(), FilterError> {
        let value = value.trim();
        let text = (!value.is_empty()).then(|| value.to_string());
        match field {
            FilterField::BpmnProcessId => self.bpmn_process_id = text,
            FilterField::StartDate => self.start_date = text,
            FilterField::EndDate => self.end_date = text,
            FilterField::ProcessDefinitionKey => self.process_definition_key = text,
            FilterField::ParentProcessInstanceKey => self.parent_process_instance_key = text,
            FilterField::State => {
                self.state = match text {
                    Some(raw) => Some(raw.parse()?),
                    None => None,
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }

    /// Non-blank fields in declaration order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let text_fields = [
            (FilterField::BpmnProcessId, &self.bpmn_process_id),
            (FilterField::StartDate, &self.start_date),
            (FilterField::EndDate, &self.end_date),
            (FilterField::ProcessDefinitionKey, &self.process_definition_key),
            (
                FilterField::ParentProcessInstanceKey,
                &self.parent_process_instance_key,
            ),
        ];

        let mut pairs: Vec<(&'static str, String)> = text_fields
            .into_iter()
            .filter_map(|(field, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (field.query_name(), v.to_string()))
            })
            .collect();

        if let Some(state) = self.state {
            pairs.push((FilterField::State.query_name(), state.as_str().to_string()));
        }
        pairs
    }
}

/// Opaque navigation tokens. At most one direction is ever set; the only
/// way to build one is through the constructors below.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorPair {
    after: Option<String>,
    before: Option<String>,
}

impl CursorPair {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn after(token: impl Into<String>) -> Self {
        Self {
            after: Some(token.into()),
            before: None,
        }
    }

    pub fn before(token: impl Into<String>) -> Self {
        Self {
            after: None,
            before: Some(token.into()),
        }
    }

    pub fn search_after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn search_before(&self) -> Option<&str> {
        self.before.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub size: NonZeroU32,
    pub filter: ResourceFilter,
    pub cursor: CursorPair,
}

impl SearchQuery {
    /// Wire order: `size`, filter fields, then the cursor.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("size", self.size.to_string())];
        pairs.extend(self.filter.query_pairs());
        if let Some(after) = self.cursor.search_after() {
            pairs.push(("searchAfter", after.to_string()));
        }
        if let Some(before) = self.cursor.search_before() {
            pairs.push(("searchBefore", before.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    pub items: Vec<ProcessInstance>,
    #[serde(default)]
    pub total: u64,
}

impl ResultPage {
    pub fn first_key(&self) -> Option<String> {
        self.items.first().map(|item| item.key.to_string())
    }

    pub fn last_key(&self) -> Option<String> {
        self.items.last().map(|item| item.key.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceCounts {
    #[serde(default)]
    pub running: u64,
    #[serde(default)]
    pub active: u64,
    #[serde(default)]
    pub with_incidents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVersionStats {
    #[serde(default)]
    pub process_id: String,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub name: String,
    pub bpmn_process_id: String,
    #[serde(default)]
    pub instances_with_active_incidents_count: u64,
    #[serde(default)]
    pub active_instances_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    pub bpmn_process_id: String,
    #[serde(default)]
    pub process_name: String,
    #[serde(default)]
    pub instances_with_active_incidents_count: u64,
    #[serde(default)]
    pub active_instances_count: u64,
    #[serde(default)]
    pub processes: Vec<ProcessVersionStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperateStatistics {
    pub stats: InstanceCounts,
    #[serde(default)]
    pub process: Vec<ProcessStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub active: u64,
    pub running: u64,
    pub incident: u64,
}

impl From<InstanceCounts> for DashboardCounts {
    fn from(value: InstanceCounts) -> Self {
        Self {
            active: value.active,
            running: value.running,
            incident: value.with_incidents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub health: HealthStatus,
    pub counts: DashboardCounts,
    pub process_stats: Vec<ProcessStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessInstanceKey;

    fn size(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).expect("non-zero")
    }

    #[test]
    fn blank_filter_fields_are_omitted() {
        let mut filter = ResourceFilter::default();
        filter
            .set(FilterField::BpmnProcessId, "   ")
            .expect("blank text");
        filter.set(FilterField::State, "").expect("blank state");
        filter.end_date = Some(String::new());
        assert!(filter.is_empty());

        let query = SearchQuery {
            size: size(10),
            filter,
            cursor: CursorPair::empty(),
        };
        assert_eq!(query.query_pairs(), vec![("size", "10".to_string())]);
    }

    #[test]
    fn cursor_follows_filter_fields() {
        let mut filter = ResourceFilter::with_state(InstanceState::Active);
        filter
            .set(FilterField::BpmnProcessId, "order-process")
            .expect("set");
        let query = SearchQuery {
            size: size(10),
            filter,
            cursor: CursorPair::after("5"),
        };
        assert_eq!(
            query.query_pairs(),
            vec![
                ("size", "10".to_string()),
                ("bpmnProcessId", "order-process".to_string()),
                ("state", "ACTIVE".to_string()),
                ("searchAfter", "5".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_state_is_rejected() {
        let mut filter = ResourceFilter::default();
        let err = filter
            .set(FilterField::State, "sleeping")
            .expect_err("must reject");
        assert!(matches!(err, FilterError::State(_)));
        assert!(filter.state.is_none());
    }

    #[test]
    fn filter_field_names_round_trip_through_parse() {
        for field in FilterField::ALL {
            assert_eq!(field.query_name().parse::<FilterField>(), Ok(field));
        }
        assert!("name".parse::<FilterField>().is_err());
    }

    #[test]
    fn cursor_constructors_set_one_direction() {
        let after = CursorPair::after("9");
        assert_eq!(after.search_after(), Some("9"));
        assert_eq!(after.search_before(), None);
        let before = CursorPair::before("3");
        assert_eq!(before.search_after(), None);
        assert_eq!(before.search_before(), Some("3"));
        assert!(CursorPair::empty().is_empty());
    }

    #[test]
    fn envelope_accepts_wrapped_and_bare_pages() {
        let wrapped = r#"{"data":{"items":[{"key":5,"bpmnProcessId":"p","processDefinitionKey":1,"state":"ACTIVE"}],"total":1}}"#;
        let bare = r#"{"items":[{"key":5,"bpmnProcessId":"p","processDefinitionKey":1,"state":"ACTIVE"}],"total":1}"#;
        for raw in [wrapped, bare] {
            let page = serde_json::from_str::<Envelope<ResultPage>>(raw)
                .expect("page")
                .into_inner();
            assert_eq!(page.total, 1);
            assert_eq!(page.items[0].key, ProcessInstanceKey(5));
            assert_eq!(page.first_key().as_deref(), Some("5"));
        }
    }

    #[test]
    fn statistics_map_into_dashboard_counts() {
        let raw = r#"{
            "stats": {"running": 12, "active": 9, "withIncidents": 3},
            "process": [{
                "bpmnProcessId": "order-process",
                "processName": "Order",
                "instancesWithActiveIncidentsCount": 3,
                "activeInstancesCount": 9,
                "processes": []
            }]
        }"#;
        let stats: OperateStatistics = serde_json::from_str(raw).expect("stats");
        let counts = DashboardCounts::from(stats.stats);
        assert_eq!(
            counts,
            DashboardCounts {
                active: 9,
                running: 12,
                incident: 3
            }
        );
        assert_eq!(stats.process[0].process_name, "Order");
    }
}
