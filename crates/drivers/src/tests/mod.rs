mod arbiter;
mod registry;
