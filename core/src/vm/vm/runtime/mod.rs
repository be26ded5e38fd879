mod exec;
mod frame;
