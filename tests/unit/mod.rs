/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

mod config_tests;
mod engine;
#[cfg(feature = "journal")]
mod journal_tests;
mod scenario_tests;
