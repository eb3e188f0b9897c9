//! Bulk-format column names, grouped per entity file.

pub mod campaign {
    pub const ID: &str = "Campaign Id";
    pub const NAME: &str = "Name";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const STATUS: &str = "Status";
    pub const START_DATE: &str = "Campaign Start Date";
    pub const END_DATE: &str = "Campaign End Date";
}

pub mod insertion_order {
    pub const ID: &str = "Io Id";
    pub const CAMPAIGN_ID: &str = "Campaign Id";
    pub const NAME: &str = "Name";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const STATUS: &str = "Status";
    pub const DETAILS: &str = "Details";
    pub const BUDGET_SEGMENTS: &str = "Budget Segments";
    pub const FREQUENCY_ENABLED: &str = "Frequency Enabled";
    pub const FREQUENCY_EXPOSURES: &str = "Frequency Exposures";
    pub const FREQUENCY_PERIOD: &str = "Frequency Period";
    pub const FREQUENCY_AMOUNT: &str = "Frequency Amount";
}

pub mod line_item {
    pub const ID: &str = "Line Item Id";
    pub const IO_ID: &str = "Io Id";
    pub const TYPE: &str = "Type";
    pub const NAME: &str = "Name";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const STATUS: &str = "Status";
    pub const DETAILS: &str = "Details";
    pub const FREQUENCY_ENABLED: &str = "Frequency Enabled";
    pub const FREQUENCY_EXPOSURES: &str = "Frequency Exposures";
    pub const FREQUENCY_PERIOD: &str = "Frequency Period";
    pub const FREQUENCY_AMOUNT: &str = "Frequency Amount";
    pub const BID_STRATEGY_VALUE: &str = "Bid Strategy Value";
    pub const CREATIVE_ASSIGNMENTS: &str = "Creative Assignments";
    pub const GEOGRAPHY_INCLUDE: &str = "Geography Targeting - Include";

    /// `Type` value of video line items
    pub const TRUEVIEW: &str = "TrueView";
}

pub mod ad_group {
    pub const ID: &str = "Ad Group Id";
    pub const LINE_ITEM_ID: &str = "Line Item Id";
    pub const NAME: &str = "Name";
    pub const STATUS: &str = "Status";
    pub const BID_COST: &str = "Bid Cost";
}

pub mod ad {
    pub const ID: &str = "Ad Id";
    pub const AD_GROUP_ID: &str = "Ad Group Id";
    pub const NAME: &str = "Name";
    pub const STATUS: &str = "Status";
    pub const VIDEO_ID: &str = "Video Id";
}

/// Entity status values
pub mod status {
    pub const COLUMN: &str = "Status";

    pub const ACTIVE: &str = "Active";
    pub const PAUSED: &str = "Paused";
    pub const DRAFT: &str = "Draft";
    pub const ARCHIVED: &str = "Archived";
    pub const DELETED: &str = "Deleted";
}
