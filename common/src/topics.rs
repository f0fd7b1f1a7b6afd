pub const TOPIC_SENSOR_TEMP: &str = "terrarium/sensor/temperature";
pub const TOPIC_SENSOR_STATUS: &str = "terrarium/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "terrarium/controller/state";

pub const TOPIC_CMD_DISABLE: &str = "terrarium/cmnd/heating/disable";
pub const TOPIC_CMD_MODE: &str = "terrarium/cmnd/heating/mode";
