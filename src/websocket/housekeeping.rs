use actix::{Actor, AsyncContext, Context};
use actix_web::web;
use log::{debug, info};
use std::time::Instant;

use crate::models::{AppState, ServerMessage};

/// Periodic pass over shared state that no single connection owns:
/// flagging idle clocks, dropping seeks of players who never came back and
/// pairing quick seeks whose rating tolerance has widened.
pub struct Housekeeper {
    pub app_state: web::Data<AppState>,
}

impl Housekeeper {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        Housekeeper { app_state }
    }

    pub fn tick(&self, now: Instant) {
        for timeout in self.app_state.games.flag_expired(now) {
            let game_id = timeout.game_id;
            self.app_state
                .broadcast_to_game(game_id, &ServerMessage::clock_update(game_id, timeout.clock));
            self.app_state
                .broadcast_to_game(game_id, &ServerMessage::game_over(game_id, timeout.outcome));
            self.app_state.finish_game(game_id);
        }

        let forgotten = self
            .app_state
            .games
            .prune_retired(now, self.app_state.config.finished_game_retention());
        if forgotten > 0 {
            debug!("Forgot {} finished games", forgotten);
        }

        for seek in self.app_state.seeks.sweep(now) {
            self.app_state
                .send_to_player(&seek.seeker_id, &ServerMessage::SeekCanceled { seek_id: seek.id });
        }

        let pairings = self.app_state.seeks.match_waiting(now);
        if !pairings.is_empty() {
            debug!("Housekeeping paired {} waiting seeks", pairings.len());
        }
        for pairing in pairings {
            self.app_state.start_game(pairing);
        }
    }
}

impl Actor for Housekeeper {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let interval = self.app_state.config.housekeeping_interval();
        info!("Housekeeping every {:?}", interval);
        ctx.run_interval(interval, |act, _| act.tick(Instant::now()));
    }
}
