extern crate assert_cli;
extern crate swarm_simulator;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

mod integration;
mod unit;
