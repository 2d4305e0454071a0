use serde::{Deserialize, Serialize};

/// An application run by the demo binary: data produced by the main program, then task calls in program order.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDto {
    pub app_id: u64,

    #[serde(default)]
    pub initial_data: Vec<DataDto>,

    pub tasks: Vec<TaskCallDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DataDto {
    File { location: String },
    Object { code: u64 },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionDto {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "INOUT")]
    InOut,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDto {
    pub direction: DirectionDto,
    pub data: DataDto,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskCallDto {
    pub signature: String,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterDto>,
    #[serde(default)]
    pub has_target: bool,
    #[serde(default)]
    pub has_return: bool,
}
