// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod buffer;
pub mod error;
pub mod impedance;
pub mod pipeline;
pub mod plot;
pub mod serial;
pub mod source;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::SampleBuffer;
pub use error::EngineError;
pub use impedance::ImpedancePoint;
pub use pipeline::CurvePipeline;
pub use plot::{
    render_bode_png, render_curve_png, render_nyquist_png, PlotRenderer, PlotStyle, PngRenderer,
};
pub use serial::SerialTransport;
pub use source::{ManualReply, ManualTransport, Transport};
