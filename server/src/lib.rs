//! # Year Guessing Game Server Library
//!
//! This library provides the authoritative server for a real-time party game:
//! a song plays, every player guesses its release year before a shared timer
//! runs out, and points are awarded by how close each guess was. It owns the
//! canonical session, validates every command, and broadcasts each change to
//! all connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! All rules are decided here. Clients render what the server tells them and
//! never decide scores, deadlines or round transitions themselves.
//!
//! ### Server-Side Time
//! A round ends when the server clock passes `started_at + timer_duration`.
//! The deadline is checked on a short tick and again before every command, so
//! a late guess is rejected no matter what timestamp the client attached.
//!
//! ### Session Continuity
//! Each player receives an opaque session token on join. Presenting it again
//! after a dropped socket restores the same player with their score, plus a
//! snapshot of whatever screen the game is currently on.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Actor
//! One task owns the game session and the connection table. Socket readers,
//! HTTP handlers and media calls all talk to it through a channel, and it
//! processes their messages strictly one after another. No lock guards the
//! game state because nothing else can reach it.
//!
//! ### Mutate, Then Broadcast
//! State machine methods return the event describing the change they made.
//! The actor queues that event on every socket only after the method has
//! returned, and each socket drains its own queue in order.
//!
//! ### Pluggable Media
//! Playback goes through the [`media::MediaController`] trait. Calls run on
//! their own tasks and their results re-enter the actor as messages, tagged so
//! that results for an old round or an old game are ignored.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The round state machine: setup, lobby, active round, results, end, and
//! reset back to setup.
//!
//! ### Scoring Module (`scoring`)
//! Pure point calculation and leaderboard ranking.
//!
//! ### Registry and Reconnect Modules (`registry`, `reconnect`)
//! Player identities, name collisions, presence and session resumption.
//!
//! ### Network and HTTP Modules (`network`, `http`)
//! The actor loop, command dispatch, and the axum router that feeds it.

pub mod broadcast;
pub mod error;
pub mod game;
pub mod http;
pub mod media;
pub mod network;
pub mod playlist;
pub mod reconnect;
pub mod registry;
pub mod round;
pub mod scoring;
pub mod timer;
pub mod utils;
