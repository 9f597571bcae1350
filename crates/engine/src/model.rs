use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Closed vocabularies
// ---------------------------------------------------------------------------

/// The seven canonical time-of-day blocks a clinic day is partitioned into,
/// in their fixed display/solve order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    Am,
    Lunch,
    Pm,
    #[serde(rename = "15")]
    B15,
    #[serde(rename = "16")]
    B16,
    #[serde(rename = "17")]
    B17,
    #[serde(rename = "18plus")]
    B18Plus,
}

/// Fixed solve/display order of the seven blocks.
pub const BLOCK_ORDER: [Block; 7] = [
    Block::Am,
    Block::Lunch,
    Block::Pm,
    Block::B15,
    Block::B16,
    Block::B17,
    Block::B18Plus,
];

/// Blocks a part-time staff member may never be assigned to.
pub const PART_TIME_FORBIDDEN_BLOCKS: [Block; 4] = [Block::B15, Block::B16, Block::B17, Block::B18Plus];

impl Block {
    /// Duration in hours, per the canonical table.
    pub fn duration_hours(self) -> u32 {
        match self {
            Block::Am => 3,
            Block::Lunch => 1,
            Block::Pm => 2,
            Block::B15 => 1,
            Block::B16 => 1,
            Block::B17 => 1,
            Block::B18Plus => 2,
        }
    }

    /// Index into [`BLOCK_ORDER`] (0-based).
    pub fn index(self) -> usize {
        BLOCK_ORDER.iter().position(|b| *b == self).expect("closed enum")
    }

    pub fn from_index(i: usize) -> Option<Block> {
        BLOCK_ORDER.get(i).copied()
    }

    /// Maps an integer hour-of-day to the block it starts, per the canonical
    /// fixed-event lookup table.
    pub fn from_start_hour(hour: i64) -> Option<Block> {
        match hour {
            9 => Some(Block::Am),
            12 => Some(Block::Lunch),
            13 => Some(Block::Pm),
            15 => Some(Block::B15),
            16 => Some(Block::B16),
            17 => Some(Block::B17),
            18 => Some(Block::B18Plus),
            _ => None,
        }
    }
}

/// Full-time staff may work any block; part-time staff are barred from the
/// late-afternoon blocks (§4.4 hard constraint 4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
}

/// Where a task or event physically takes place; only `Visit` tasks are
/// subject to the transport hard constraints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    InClinic,
    Outing,
    Visit,
}

/// Display color shown for a non-task assignment cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusColor {
    Off,
    PreWork,
    PostWork,
    Visit,
    Custom,
}

/// How urgently an event must be placed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Required,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Default soft-constraint weight for an unassigned non-required event.
    pub fn unassigned_penalty_weight(self) -> i64 {
        match self {
            Priority::Required => 0, // required events are a hard constraint, not penalized
            Priority::High => 800,
            Priority::Medium => 400,
            Priority::Low => 100,
        }
    }
}

/// Lifecycle state of an Event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Unassigned,
    Assigned,
    Hold,
    Done,
}

/// Lifecycle state of a Schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Draft,
    Reviewing,
    Confirmed,
}

/// Where an assignment came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    Manual,
    Solver,
    Imported,
}

/// Dispatch key for declarative rules (§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    Headcount,
    Availability,
    Preference,
    Recurring,
    SpecificDate,
    SkillReq,
    ResourceReq,
}

/// Whether a rule or violation is a hard requirement or an advisory one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Hardness {
    Hard,
    Soft,
}

/// Resource categories referenced by task types and events. Kept open
/// (`String`) in the wire format since operators may introduce new resource
/// types (e.g. `room`) without a code change, but `car`/`bicycle` are the
/// only ones the transport hard constraints (§4.4 #3) special-case.
pub type ResourceType = String;

// ---------------------------------------------------------------------------
// Skill codes
// ---------------------------------------------------------------------------

pub type SkillCode = String;

// ---------------------------------------------------------------------------
// Master data entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub employment_type: EmploymentType,
    pub job_category: String,
    pub can_drive: bool,
    pub can_bicycle: bool,
    pub is_active: bool,
    /// Skill codes held by this staff member (StaffSkill rows collapsed to a
    /// set — level is not consulted by any constraint in this engine).
    pub skills: BTreeSet<SkillCode>,
}

impl Staff {
    pub fn has_skills(&self, required: &BTreeSet<SkillCode>) -> bool {
        required.is_subset(&self.skills)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskType {
    pub code: String,
    pub display_name: String,
    pub default_blocks: Vec<Block>,
    pub required_skills: BTreeSet<SkillCode>,
    pub preferred_skills: BTreeSet<SkillCode>,
    pub required_resources: BTreeSet<ResourceType>,
    pub min_staff: u32,
    pub max_staff: Option<u32>,
    pub location_type: LocationType,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub name: String,
    pub capacity: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub label: String,
    pub template_type: TemplateType,
    pub hard_or_soft: Hardness,
    /// 1..=1000
    pub weight: u32,
    pub body: serde_json::Value,
    pub tags: Vec<String>,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "timeConstraintType", rename_all = "camelCase")]
pub enum TimeConstraint {
    Fixed {
        date: chrono::NaiveDate,
        start: i64,
    },
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weekdays: Option<BTreeSet<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        period: Option<RangePeriod>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        month: Option<String>,
    },
    Candidates {
        slots: Vec<FixedSlot>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RangePeriod {
    Am,
    Pm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedSlot {
    pub date: chrono::NaiveDate,
    pub start: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_code: Option<String>,
    pub location_type: LocationType,
    pub duration_hours: u32,
    #[serde(flatten)]
    pub time_constraint: TimeConstraint,
    pub required_skills: BTreeSet<SkillCode>,
    pub required_resources: BTreeSet<ResourceType>,
    pub priority: Priority,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<chrono::NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Schedule & assignments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    /// `YYYY-MM`.
    pub year_month: String,
    pub status: ScheduleStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentValue {
    Task(String),
    StatusColor(StatusColor),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleAssignment {
    pub schedule_id: String,
    pub staff_id: String,
    pub date: chrono::NaiveDate,
    pub block: Block,
    pub value: AssignmentValue,
    pub is_locked: bool,
    pub source: AssignmentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ScheduleAssignment {
    pub fn task_code(&self) -> Option<&str> {
        match &self.value {
            AssignmentValue::Task(code) => Some(code.as_str()),
            AssignmentValue::StatusColor(_) => None,
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self.value, AssignmentValue::StatusColor(StatusColor::Off))
    }
}

// ---------------------------------------------------------------------------
// Resource booking (derived view, §3 ResourceBooking)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBooking {
    pub resource_type: ResourceType,
    pub date: chrono::NaiveDate,
    pub block: Block,
    pub event_id: String,
}
