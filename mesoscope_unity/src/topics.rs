//! Fixed MQTT topic table (§4.5).

pub const SESSION_START: &str = "Gimbl/Session/Start";
pub const SESSION_STOP: &str = "Gimbl/Session/Stop";
pub const CUE_SEQUENCE_TRIGGER: &str = "CueSequenceTrigger/";
pub const CUE_SEQUENCE: &str = "CueSequence/";
pub const SCENE_NAME_TRIGGER: &str = "SceneNameTrigger/";
pub const SCENE_NAME: &str = "SceneName/";
pub const MUST_LICK_TRUE: &str = "MustLick/True/";
pub const MUST_LICK_FALSE: &str = "MustLick/False/";
pub const VISIBLE_MARKER_TRUE: &str = "VisibleMarker/True/";
pub const VISIBLE_MARKER_FALSE: &str = "VisibleMarker/False/";
pub const LINEAR_TREADMILL_DATA: &str = "LinearTreadmill/Data";
pub const LICK_PORT: &str = "LickPort/";
pub const REWARD: &str = "Gimbl/Reward/";

/// Inbound topics the bridge must subscribe to on connect.
pub const INBOUND_TOPICS: [&str; 5] =
    [SESSION_START, SESSION_STOP, CUE_SEQUENCE, SCENE_NAME, REWARD];
