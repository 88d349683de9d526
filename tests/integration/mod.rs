/****************** Platform *****************/
mod cli;
mod scenario;

/****************** Protocols ****************/
mod line_topology;
