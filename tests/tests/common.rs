#![allow(dead_code)]

use std::sync::Arc;

use patchwork::{
    tracking::{AggregateMember, ChangeTracked, Lifecycle, ModelState, PropertyDelta, Tracked, TrackedAggregate, TrackedRef},
    Aggregate, AliasRegistry, Entity, ModelType, PatchResolver, PatchSet, Ref, Repository, Schema, Uid,
};
use patchwork_storage_sled::SledBackend;
use serde::{Deserialize, Serialize};
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { let _ = tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().try_init(); }

// ---- Server side: persisted entities ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Artist {
    pub uid: Uid,
    pub name: String,
}

impl Entity for Artist {
    fn collection() -> &'static str { "artist" }
    fn uid(&self) -> &Uid { &self.uid }
    fn with_uid(uid: Uid) -> Self { Artist { uid, name: String::new() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Playlist {
    pub uid: Uid,
    pub name: String,
    pub tracks: Aggregate<Track>,
}

impl Entity for Playlist {
    fn collection() -> &'static str { "playlist" }
    fn uid(&self) -> &Uid { &self.uid }
    fn with_uid(uid: Uid) -> Self { Playlist { uid, name: String::new(), tracks: Aggregate::new() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Track {
    pub uid: Uid,
    pub title: String,
    pub artist: Option<Ref<Artist>>,
}

impl Entity for Track {
    fn collection() -> &'static str { "track" }
    fn uid(&self) -> &Uid { &self.uid }
    fn with_uid(uid: Uid) -> Self { Track { uid, title: String::new(), artist: None } }
}

pub type Server = PatchResolver<Repository<SledBackend>>;

pub fn server() -> anyhow::Result<Server> {
    let mut aliases = AliasRegistry::new();
    aliases.register::<Artist>("artist")?.register::<Playlist>("playlist")?.register::<Track>("track")?;
    let schema = Schema::new().aggregate("Tracks", |playlist: &mut Playlist| &mut playlist.tracks);
    let repository = Repository::new(SledBackend::new_test()?).register::<Artist>().register::<Playlist>().register::<Track>();
    Ok(PatchResolver::new(repository, Arc::new(aliases), Arc::new(schema)))
}

pub async fn stored<T: Entity>(server: &Server, uid: &Uid) -> anyhow::Result<Option<T>> {
    Ok(patchwork::EntityStore::<T>::retrieve(server.repository().backend(), uid).await?)
}

// ---- Client side: change-tracked models ----

pub struct LiveArtist {
    pub uid: Uid,
    pub lifecycle: Lifecycle,
    pub name: Tracked<String>,
}

impl LiveArtist {
    pub fn create(name: &str) -> Self {
        let mut artist = LiveArtist { uid: Uid::generate(), lifecycle: Lifecycle::added(), name: Tracked::default() };
        artist.name.set(name.into());
        artist
    }

    pub fn accept_changes(&mut self) {
        self.lifecycle.accept_changes();
        self.name.accept_changes();
    }
}

impl ChangeTracked for LiveArtist {
    fn model_type(&self) -> ModelType { ModelType::of::<Self>() }
    fn uid(&self) -> &Uid { &self.uid }
    fn state(&self) -> ModelState { self.lifecycle.state(self.name.is_changed()) }
    fn delta(&self) -> Vec<PropertyDelta<'_>> {
        let mut delta = Vec::new();
        self.name.push_delta("Name", &mut delta);
        delta
    }
}

pub struct LiveTrack {
    pub uid: Uid,
    pub lifecycle: Lifecycle,
    pub title: Tracked<String>,
    pub artist: TrackedRef,
}

impl LiveTrack {
    pub fn create(title: &str, artist: Option<&LiveArtist>) -> Self {
        let mut track = LiveTrack { uid: Uid::generate(), lifecycle: Lifecycle::added(), title: Tracked::default(), artist: TrackedRef::default() };
        track.title.set(title.into());
        if let Some(artist) = artist {
            track.artist.point_to::<LiveArtist>(artist.uid.clone());
        }
        track
    }
}

impl ChangeTracked for LiveTrack {
    fn model_type(&self) -> ModelType { ModelType::of::<Self>() }
    fn uid(&self) -> &Uid { &self.uid }
    fn state(&self) -> ModelState { self.lifecycle.state(self.title.is_changed() || self.artist.is_changed()) }
    fn delta(&self) -> Vec<PropertyDelta<'_>> {
        let mut delta = Vec::new();
        self.title.push_delta("Title", &mut delta);
        self.artist.push_delta("Artist", &mut delta);
        delta
    }
}

impl AggregateMember for LiveTrack {
    fn lifecycle_mut(&mut self) -> &mut Lifecycle { &mut self.lifecycle }

    fn accept_changes(&mut self) {
        self.lifecycle.accept_changes();
        self.title.accept_changes();
        self.artist.accept_changes();
    }
}

pub struct LivePlaylist {
    pub uid: Uid,
    pub lifecycle: Lifecycle,
    pub name: Tracked<String>,
    pub tracks: TrackedAggregate<LiveTrack>,
}

impl LivePlaylist {
    pub fn create(name: &str) -> Self {
        let mut playlist = LivePlaylist { uid: Uid::generate(), lifecycle: Lifecycle::added(), name: Tracked::default(), tracks: TrackedAggregate::default() };
        playlist.name.set(name.into());
        playlist
    }

    pub fn accept_changes(&mut self) {
        self.lifecycle.accept_changes();
        self.name.accept_changes();
        self.tracks.accept_changes();
    }
}

impl ChangeTracked for LivePlaylist {
    fn model_type(&self) -> ModelType { ModelType::of::<Self>() }
    fn uid(&self) -> &Uid { &self.uid }
    fn state(&self) -> ModelState { self.lifecycle.state(self.name.is_changed() || self.tracks.is_changed()) }
    fn delta(&self) -> Vec<PropertyDelta<'_>> {
        let mut delta = Vec::new();
        self.name.push_delta("Name", &mut delta);
        self.tracks.push_delta("Tracks", &mut delta);
        delta
    }
}

pub fn client_aliases() -> AliasRegistry {
    let mut aliases = AliasRegistry::new();
    aliases.register::<LiveArtist>("artist").unwrap();
    aliases.register::<LivePlaylist>("playlist").unwrap();
    aliases.register::<LiveTrack>("track").unwrap();
    aliases
}

/// Ship a patch set through its JSON wire form, the way a client would send it to a server.
pub fn transmit(patches: &PatchSet) -> anyhow::Result<PatchSet> {
    let json = patches.to_json()?;
    tracing::info!("transmit {} patches: {json}", patches.len());
    Ok(PatchSet::from_json_many(&json)?)
}
